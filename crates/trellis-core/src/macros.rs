//! Declarative helpers.

/// Builds an [`Implementation`](crate::Implementation) binding a trait object
/// to a concrete component.
///
/// ```rust,ignore
/// // Consumers of `dyn Repository` receive the raw `SqlRepository`.
/// container.register_implementation(implementation!(dyn Repository => SqlRepository))?;
///
/// // Consumers of `dyn Notifier` go through `Proxy<EmailNotifier>`, which
/// // must implement `Notifier`.
/// container.register_implementation(implementation!(proxied dyn Notifier => EmailNotifier))?;
/// ```
#[macro_export]
macro_rules! implementation {
    (proxied dyn $iface:path => $component:ty) => {
        $crate::Implementation::proxied::<dyn $iface, $component>(
            |proxy: ::std::sync::Arc<$crate::Proxy<$component>>| -> ::std::sync::Arc<dyn $iface> {
                proxy
            },
        )
    };
    (dyn $iface:path => $component:ty) => {
        $crate::Implementation::of::<dyn $iface, $component>(
            |component: ::std::sync::Arc<$component>| -> ::std::sync::Arc<dyn $iface> {
                component
            },
        )
    };
}

#[cfg(test)]
mod tests {
    use crate::{Component, ComponentDescriptor, Interface, Proxy, TypeKey};

    trait Greeter: Send + Sync {
        fn greet(&self) -> &'static str;
    }

    impl Interface for dyn Greeter {}

    #[derive(Default)]
    struct Polite;

    impl Greeter for Polite {
        fn greet(&self) -> &'static str {
            "good day"
        }
    }

    impl Greeter for Proxy<Polite> {
        fn greet(&self) -> &'static str {
            self.call("greet", |target| target.greet())
        }
    }

    impl Component for Polite {
        fn descriptor() -> ComponentDescriptor {
            ComponentDescriptor::with_default::<Self>().build()
        }
    }

    #[test]
    fn test_both_forms_bind_the_same_pair() {
        let plain = implementation!(dyn Greeter => Polite);
        let proxied = implementation!(proxied dyn Greeter => Polite);
        for binding in [plain, proxied] {
            assert_eq!(binding.interface(), TypeKey::of::<dyn Greeter>());
            assert_eq!(binding.concrete(), TypeKey::of::<Polite>());
        }
    }
}
