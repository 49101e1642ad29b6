mod orchestration;
mod reconcile;

use std::sync::Arc;

use crate::core::config::ProviderConfig;
use crate::core::provider::stateless::StatelessClient;
use crate::core::provider::testing::MockConnector;
use crate::core::push::PushHub;
use crate::core::store::SessionStore;
use crate::core::templates::TemplateRegistry;

use super::RuntimeRegistry;

pub(super) fn test_registry(connector: Arc<MockConnector>) -> Arc<RuntimeRegistry> {
    let store = Arc::new(SessionStore::open_in_memory().expect("store"));
    test_registry_with(connector, store, PushHub::new(64))
}

pub(super) fn test_registry_with(
    connector: Arc<MockConnector>,
    store: Arc<SessionStore>,
    push: PushHub,
) -> Arc<RuntimeRegistry> {
    let templates = Arc::new(TemplateRegistry::with_builtin());
    // Never reachable in tests; the facts role rides the mock or stays idle.
    let stateless = Arc::new(StatelessClient::new(
        "http://127.0.0.1:9/unreachable".to_string(),
        "test-key".to_string(),
    ));
    Arc::new(RuntimeRegistry::new(
        store,
        push,
        templates,
        connector,
        stateless,
        ProviderConfig::default(),
    ))
}
