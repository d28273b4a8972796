//! The order-processing object graph.
//!
//! ```text
//! OrderService ──param──▶ dyn OrderRepository ──default──▶ InMemoryRepository
//!      │ field ──▶ dyn Notifier ──proxied──▶ Proxy<EmailNotifier>  (pool "mail")
//!      │ field ──▶ EventBus ──OrderPlaced──▶ AuditLog, Inventory    (pool "application")
//!      └ lazy  ──▶ AuditLog
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use anyhow::{Result, bail};
use parking_lot::{Mutex, RwLock};
use tracing::info;
use trellis::prelude::*;

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OrderPlaced {
    pub id: u64,
    pub item: String,
    pub quantity: u32,
}

// ─── Repository ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Order {
    pub id: u64,
    pub item: String,
    pub quantity: u32,
}

pub trait OrderRepository: Send + Sync {
    fn save(&self, order: Order);
    fn count(&self) -> usize;
}

impl Interface for dyn OrderRepository {
    fn default_implementation() -> Option<Implementation> {
        Some(implementation!(dyn OrderRepository => InMemoryRepository))
    }
}

#[derive(Default)]
pub struct InMemoryRepository {
    orders: RwLock<Vec<Order>>,
}

impl OrderRepository for InMemoryRepository {
    fn save(&self, order: Order) {
        self.orders.write().push(order);
    }

    fn count(&self) -> usize {
        self.orders.read().len()
    }
}

impl Component for InMemoryRepository {
    fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::with_default::<Self>().build()
    }
}

// ─── Notifier ────────────────────────────────────────────────────────────────

pub trait Notifier: Send + Sync {
    /// Returns once the message is queued.
    fn notify(&self, order_id: u64) -> ContainerResult<()>;
}

impl Interface for dyn Notifier {}

#[derive(Default)]
pub struct EmailNotifier {
    sender: Property<String>,
    sent: AtomicUsize,
}

impl EmailNotifier {
    fn send(&self, order_id: u64) {
        let thread = std::thread::current();
        info!(
            sender = self.sender.as_str(),
            order_id,
            thread = thread.name().unwrap_or("unnamed"),
            "Confirmation mail sent"
        );
        self.sent.fetch_add(1, Ordering::SeqCst);
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

impl Notifier for Proxy<EmailNotifier> {
    fn notify(&self, order_id: u64) -> ContainerResult<()> {
        self.spawn("notify", move |notifier| notifier.send(order_id))
    }
}

impl Component for EmailNotifier {
    fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::with_default::<Self>()
            .value("sender", "${mail.sender}", |n| &n.sender)
            .async_method_on("notify", "mail")
            .build()
    }
}

// ─── Listeners ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct AuditLog {
    entries: Mutex<Vec<String>>,
}

impl AuditLog {
    fn record(&self, event: &OrderPlaced) {
        self.entries
            .lock()
            .push(format!("#{} {} x{}", event.id, event.item, event.quantity));
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }
}

impl Component for AuditLog {
    fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::with_default::<Self>()
            .listener::<OrderPlaced, _>("on_order_placed", |audit, event| audit.record(event))
            .build()
    }
}

/// Reserves stock off the publishing thread.
#[derive(Default)]
pub struct Inventory {
    reserved: Mutex<BTreeMap<String, u32>>,
}

impl Inventory {
    fn reserve(&self, event: &OrderPlaced) {
        *self.reserved.lock().entry(event.item.clone()).or_default() += event.quantity;
    }

    pub fn reserved(&self) -> BTreeMap<String, u32> {
        self.reserved.lock().clone()
    }
}

impl Component for Inventory {
    fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::with_default::<Self>()
            .async_method("on_order_placed")
            .listener::<OrderPlaced, _>("on_order_placed", |inventory, event| {
                inventory.reserve(event)
            })
            .build()
    }
}

// ─── Service ─────────────────────────────────────────────────────────────────

pub struct OrderService {
    repository: Arc<dyn OrderRepository>,
    notifier: Inject<dyn Notifier>,
    events: Inject<EventBus>,
    audit: Lazy<AuditLog>,
    currency: Property<String>,
    max_quantity: Property<u32>,
    next_id: AtomicU64,
}

impl OrderService {
    pub fn place(&self, item: &str, quantity: u32) -> Result<u64> {
        if quantity == 0 || quantity > *self.max_quantity {
            bail!("quantity must be between 1 and {}", *self.max_quantity);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.repository.save(Order {
            id,
            item: item.to_string(),
            quantity,
        });

        let delivered = self.events.publish(OrderPlaced {
            id,
            item: item.to_string(),
            quantity,
        })?;
        self.notifier.notify(id)?;

        info!(id, item, quantity, listeners = delivered, "Order placed");
        Ok(id)
    }

    pub fn stored(&self) -> usize {
        self.repository.count()
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Audit entries so far; resolves the audit log on first call.
    pub fn audit_trail(&self) -> ContainerResult<Vec<String>> {
        Ok(self.audit.get()?.entries())
    }
}

impl Component for OrderService {
    fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor::builder(|args| {
            Ok(Self {
                repository: args.next()?,
                notifier: Inject::new(),
                events: Inject::new(),
                audit: Lazy::new(),
                currency: Property::new(),
                max_quantity: Property::new(),
                next_id: AtomicU64::new(0),
            })
        })
        .param::<dyn OrderRepository>()
        .field::<dyn Notifier>("notifier", |s| &s.notifier)
        .field::<EventBus>("events", |s| &s.events)
        .lazy_field::<AuditLog>("audit", |s| &s.audit)
        .value("currency", "${orders.currency}", |s| &s.currency)
        .value("max_quantity", "${orders.max_quantity}", |s| &s.max_quantity)
        .initializer(|service| {
            info!(currency = service.currency(), "Order service ready");
            Ok(())
        })
        .build()
    }
}

/// Registers every component of the graph.
pub fn register(container: &Container) -> ContainerResult<()> {
    container.register_interface::<dyn OrderRepository>()?;
    container.register_implementation(implementation!(proxied dyn Notifier => EmailNotifier))?;
    container.register_component::<AuditLog>()?;
    container.register_component::<Inventory>()?;
    container.register_component::<OrderService>()?;
    Ok(())
}
