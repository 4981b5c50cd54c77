//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use cadence::FnExtension;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

/// Install an env-filtered subscriber once (`RUST_LOG=cadence=debug`)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Ordered record of what ran, shared between extensions and test bodies
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Entries with the given prefix, prefix included
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// Extension logging `name:before_all:Container`, `name:before_each`, ...
pub fn hooks(journal: &Journal, name: &'static str) -> FnExtension {
    let (a, b, c, d) = (journal.clone(), journal.clone(), journal.clone(), journal.clone());
    FnExtension::new(name)
        .before_all(move |cx| {
            a.push(format!("{name}:before_all:{}", cx.display_name()));
            Ok(())
        })
        .before_each(move |_| {
            b.push(format!("{name}:before_each"));
            Ok(())
        })
        .after_each(move |_| {
            c.push(format!("{name}:after_each"));
            Ok(())
        })
        .after_all(move |cx| {
            d.push(format!("{name}:after_all:{}", cx.display_name()));
            Ok(())
        })
}

/// Extension logging instance hooks with the container they apply to
pub fn instance_hooks(journal: &Journal, name: &'static str) -> FnExtension {
    let (a, b, c) = (journal.clone(), journal.clone(), journal.clone());
    FnExtension::new(name)
        .pre_construct(move |factory, _| {
            a.push(format!("{name}:pre_construct:{}", factory.container));
            Ok(())
        })
        .post_process(move |instance, _| {
            b.push(format!("{name}:post_process:{}", instance.container()));
            Ok(())
        })
        .pre_destroy(move |instance, _| {
            c.push(format!("{name}:pre_destroy:{}", instance.container()));
            Ok(())
        })
}

/// Test body that only records its own name
pub fn body(journal: &Journal, name: &'static str) -> cadence::TestCase {
    let journal = journal.clone();
    cadence::TestCase::new(name, move |_| {
        journal.push(format!("body:{name}"));
        Ok(())
    })
}
