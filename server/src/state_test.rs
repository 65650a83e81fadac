use super::*;

#[tokio::test]
async fn clones_share_the_store() {
    let state = test_helpers::test_app_state();
    let clone = state.clone();
    let id = test_helpers::seed_conversation(&state, None).await;
    assert!(clone.store.get_conversation(id, None).await.is_ok());
    assert!(Arc::ptr_eq(&state.config, &clone.config));
}

#[test]
fn test_state_uses_defaults() {
    let state = test_helpers::test_app_state();
    assert!(state.llm.is_none());
    assert!(state.search.is_none());
    assert_eq!(state.config.chat.max_steps, crate::config::DEFAULT_CHAT_MAX_STEPS);
    assert_eq!(state.locks.active(), 0);
}
