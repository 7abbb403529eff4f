//! Shared application state.

use std::sync::Arc;

use engine::{
    CartPricingEngine, CheckoutService, IdResolutionCache, InMemoryPaymentGateway,
    LoggingNotifier, ReservationReaper,
};
use store::CommerceStore;

use crate::config::Config;
use crate::identity::{HeaderIdentity, IdentityResolver};

/// Checkout wired to the sandbox gateway and the logging notifier.
pub type Checkout<S> = CheckoutService<S, InMemoryPaymentGateway, LoggingNotifier>;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub checkout: Checkout<S>,
    pub reaper: ReservationReaper<S>,
    /// Same gateway instance the checkout service talks to.
    pub gateway: InMemoryPaymentGateway,
    pub identity: Arc<dyn IdentityResolver>,
    pub webhook_secret: String,
    pub reaper_batch_limit: usize,
}

impl<S: CommerceStore + Clone + 'static> AppState<S> {
    /// Builds the engine services over `store` from `config`.
    pub fn new(store: S, config: &Config) -> Self {
        let gateway = InMemoryPaymentGateway::new();
        let cache = IdResolutionCache::with_ttl(store.clone(), config.id_cache_ttl);
        let pricing = CartPricingEngine::new(store.clone(), cache);
        let checkout = CheckoutService::new(
            store.clone(),
            pricing,
            gateway.clone(),
            LoggingNotifier,
            config.checkout_settings(),
        );

        Self {
            checkout,
            reaper: ReservationReaper::new(store),
            gateway,
            identity: Arc::new(HeaderIdentity),
            webhook_secret: config.webhook_secret.clone(),
            reaper_batch_limit: config.reaper_batch_limit,
        }
    }

    /// Replaces the identity resolver.
    pub fn with_identity(mut self, identity: impl IdentityResolver + 'static) -> Self {
        self.identity = Arc::new(identity);
        self
    }
}
