//! Static metadata describing registrable types.
//!
//! A [`ComponentDescriptor`] lists a component's constructor parameters,
//! injectable fields, property placeholders, method behaviors and
//! initializer hook. An [`Implementation`] binds an [`Interface`] to the
//! component that satisfies it.

mod component;
mod interface;

pub use component::{
    Arguments, Component, ComponentDescriptor, DescriptorBuilder, FieldSpec, MethodBehavior,
    MethodSpec, ParamSpec, ValueSpec,
};
pub use interface::{Implementation, Interface};
