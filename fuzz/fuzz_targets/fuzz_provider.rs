#![no_main]

//! Fuzz target for provider construction and resolution
//!
//! Registers a chain of services with arbitrary lifetimes and modes, then
//! resolves them from several scopes and checks lifetime semantics.

use arbitrary::Arbitrary;
use dependency_realizer::{
    Lifetime, ProviderMode, ProviderOptions, Service, ServiceDescriptor, ServiceProvider,
};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

struct Leaf;

#[allow(dead_code)]
struct Middle(Arc<Leaf>);

#[allow(dead_code)]
struct Top(Arc<Middle>, Arc<Leaf>);

impl Service for Leaf {
    type Dependencies = ();
    fn create(_: ()) -> Self {
        Leaf
    }
}

impl Service for Middle {
    type Dependencies = Arc<Leaf>;
    fn create(leaf: Arc<Leaf>) -> Self {
        Middle(leaf)
    }
}

impl Service for Top {
    type Dependencies = (Arc<Middle>, Arc<Leaf>);
    fn create((middle, leaf): (Arc<Middle>, Arc<Leaf>)) -> Self {
        Top(middle, leaf)
    }
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum FuzzLifetime {
    Singleton,
    Scoped,
    Transient,
}

impl From<FuzzLifetime> for Lifetime {
    fn from(lifetime: FuzzLifetime) -> Self {
        match lifetime {
            FuzzLifetime::Singleton => Lifetime::Singleton,
            FuzzLifetime::Scoped => Lifetime::Scoped,
            FuzzLifetime::Transient => Lifetime::Transient,
        }
    }
}

#[derive(Debug, Arbitrary)]
enum Registration {
    Leaf(FuzzLifetime),
    Middle(FuzzLifetime),
    Top(FuzzLifetime),
}

#[derive(Debug, Arbitrary)]
struct Input {
    lazy: bool,
    registrations: Vec<Registration>,
    scopes: u8,
}

fuzz_target!(|input: Input| {
    let mut leaf = None;
    let mut middle = None;
    let mut top = None;

    let services = input
        .registrations
        .iter()
        .map(|registration| match *registration {
            Registration::Leaf(lifetime) => {
                leaf = Some(Lifetime::from(lifetime));
                ServiceDescriptor::service::<Leaf>(lifetime.into())
            }
            Registration::Middle(lifetime) => {
                middle = Some(Lifetime::from(lifetime));
                ServiceDescriptor::service::<Middle>(lifetime.into())
            }
            Registration::Top(lifetime) => {
                top = Some(Lifetime::from(lifetime));
                ServiceDescriptor::service::<Top>(lifetime.into())
            }
        })
        .collect();

    let mode = if input.lazy { ProviderMode::Lazy } else { ProviderMode::Eager };
    let result = ServiceProvider::build_with(services, ProviderOptions::new().with_mode(mode));

    // Eager builds fail exactly when a registered service misses a dependency
    let complete = (middle.is_none() || leaf.is_some()) && (top.is_none() || (middle.is_some() && leaf.is_some()));
    let provider = match (mode, result) {
        (ProviderMode::Eager, Err(err)) => {
            assert!(!complete, "unexpected build failure: {}", err);
            return;
        }
        (_, Ok(provider)) => provider,
        (ProviderMode::Lazy, Err(err)) => panic!("lazy build failed: {}", err),
    };
    if mode == ProviderMode::Eager {
        assert!(complete);
        assert!(provider.is_frozen());
    }

    let scopes: Vec<_> = (0..input.scopes % 4 + 1).map(|_| provider.create_scope()).collect();
    for scope in &scopes {
        if let Some(lifetime) = leaf {
            let a = scope.get::<Leaf>().unwrap();
            let b = scope.get::<Leaf>().unwrap();
            assert_eq!(Arc::ptr_eq(&a, &b), lifetime != Lifetime::Transient);
        }
        if top.is_some() {
            assert_eq!(scope.get::<Top>().is_ok(), complete);
        }
    }

    let snapshot_entries = provider.diagnostics().snapshot_entries;
    if mode == ProviderMode::Lazy {
        assert_eq!(snapshot_entries, 0);
    }
});
