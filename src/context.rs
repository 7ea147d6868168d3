//! Bundles the process-wide registries behind one `Arc`-held struct instead
//! of package-level globals (spec §9, REDESIGN FLAGS).
//!
//! Grounded on `pubsub::Client` owning its `SubscriberClient`/
//! `PublisherClient` rather than reaching for globals — `ServiceContext`
//! plays the same role here for `Sender`/`Puller` construction. Unlike
//! `Middleware`, which the `Sender` now builds fresh per call from a
//! template's action list, the pieces held here are long-lived and shared
//! across every call.

use std::sync::Arc;

use crate::callback::CallbackRegistry;
use crate::config::ConfigStore;
use crate::filter::{FilterChain, VariableCache};
use crate::sender::{Sender, SenderConfig};
use crate::vendor::VendorRegistry;

#[derive(Clone)]
pub struct ServiceContext {
    pub config_store: Arc<ConfigStore>,
    pub filters: Arc<FilterChain>,
    pub variables: Arc<VariableCache>,
    pub vendors: Arc<VendorRegistry>,
    pub callbacks: Arc<CallbackRegistry>,
}

impl ServiceContext {
    pub fn new(
        config_store: Arc<ConfigStore>,
        filters: Arc<FilterChain>,
        variables: Arc<VariableCache>,
        vendors: Arc<VendorRegistry>,
        callbacks: Arc<CallbackRegistry>,
    ) -> Self {
        ServiceContext { config_store, filters, variables, vendors, callbacks }
    }

    /// Builds a `Sender` sharing this context's registries. Every call
    /// resolves its own middleware from the template it is given, so one
    /// `Sender` is safe to reuse across every template.
    pub fn sender(&self, config: SenderConfig) -> Sender {
        Sender::new(
            self.config_store.clone(),
            self.filters.clone(),
            self.variables.clone(),
            self.vendors.clone(),
            self.callbacks.clone(),
            config,
        )
    }
}
