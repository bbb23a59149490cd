//! End-to-end wizard walk against the real libSQL store: fill every step,
//! publish, and prove the flow resumes across sessions.

use std::sync::Arc;

use provider_setup::config::FlowConfig;
use provider_setup::error::FlowError;
use provider_setup::onboarding::{FieldPatch, FlowController, ServiceEntry, SetupStep};
use provider_setup::store::{LibSqlStore, ProgressStore};
use rust_decimal_macros::dec;

fn service(name: &str, price: rust_decimal::Decimal, duration: u32) -> ServiceEntry {
    ServiceEntry {
        name: name.into(),
        price,
        duration_minutes: duration,
        description: None,
        category: None,
    }
}

async fn controller(store: &Arc<LibSqlStore>, owner: &str) -> FlowController {
    let store: Arc<dyn ProgressStore> = store.clone();
    FlowController::load(owner, store, FlowConfig::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn full_wizard_walk_to_completion() {
    let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
    let flow = controller(&store, "owner-1").await;

    assert_eq!(flow.current_step().await, SetupStep::BasicInfo);

    let step = flow
        .advance(Some(FieldPatch {
            business_name: Some("Ana's Nails".into()),
            category: Some("unas".into()),
            ..Default::default()
        }))
        .await
        .unwrap();
    assert_eq!(step, SetupStep::Identifier);

    let step = flow
        .advance(Some(FieldPatch {
            username: Some("ana-nails".into()),
            ..Default::default()
        }))
        .await
        .unwrap();
    assert_eq!(step, SetupStep::Services);

    let step = flow
        .advance(Some(FieldPatch {
            services: Some(vec![
                service("Corte", dec!(150), 30),
                // Trailing blank row from the UI must not block the step.
                ServiceEntry::default(),
            ]),
            ..Default::default()
        }))
        .await
        .unwrap();
    assert_eq!(step, SetupStep::Contact);

    let step = flow
        .advance(Some(FieldPatch {
            whatsapp_phone: Some("+5215512345678".into()),
            postal_code: Some("06700".into()),
            ..Default::default()
        }))
        .await
        .unwrap();
    assert_eq!(step, SetupStep::Preview);

    flow.complete().await.unwrap();
    let record = flow.record().await;
    assert!(record.completed);
    assert!(record.completed_at.is_some());
}

#[tokio::test]
async fn progress_resumes_across_sessions() {
    let store = Arc::new(LibSqlStore::new_memory().await.unwrap());

    {
        let flow = controller(&store, "owner-1").await;
        flow.advance(Some(FieldPatch {
            business_name: Some("Ana's Nails".into()),
            category: Some("unas".into()),
            ..Default::default()
        }))
        .await
        .unwrap();
        flow.advance(Some(FieldPatch {
            username: Some("ana-nails".into()),
            ..Default::default()
        }))
        .await
        .unwrap();
    }

    // New session over the same store: fields and position come back.
    let flow = controller(&store, "owner-1").await;
    assert_eq!(flow.current_step().await, SetupStep::Services);
    let record = flow.record().await;
    assert_eq!(record.business_name, "Ana's Nails");
    assert_eq!(record.username, "ana-nails");
}

#[tokio::test]
async fn back_navigation_keeps_entered_fields() {
    let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
    let flow = controller(&store, "owner-1").await;

    flow.advance(Some(FieldPatch {
        business_name: Some("Ana's Nails".into()),
        category: Some("unas".into()),
        ..Default::default()
    }))
    .await
    .unwrap();

    assert_eq!(flow.retreat().await, Some(SetupStep::BasicInfo));
    let record = flow.record().await;
    assert_eq!(record.business_name, "Ana's Nails");

    // Unchanged, still-valid data advances right back.
    assert_eq!(flow.advance(None).await.unwrap(), SetupStep::Identifier);
}

#[tokio::test]
async fn second_owner_cannot_take_the_same_username() {
    let store = Arc::new(LibSqlStore::new_memory().await.unwrap());

    let first = controller(&store, "owner-1").await;
    first
        .advance(Some(FieldPatch {
            business_name: Some("Ana's Nails".into()),
            category: Some("unas".into()),
            ..Default::default()
        }))
        .await
        .unwrap();
    first
        .advance(Some(FieldPatch {
            username: Some("ana-nails".into()),
            ..Default::default()
        }))
        .await
        .unwrap();

    let second = controller(&store, "owner-2").await;
    second
        .advance(Some(FieldPatch {
            business_name: Some("Bella Spa".into()),
            category: Some("spa".into()),
            ..Default::default()
        }))
        .await
        .unwrap();
    let err = second
        .advance(Some(FieldPatch {
            username: Some("ana-nails".into()),
            ..Default::default()
        }))
        .await
        .unwrap_err();

    match err {
        FlowError::Conflict { field } => assert_eq!(field, "username"),
        other => panic!("expected Conflict, got {other:?}"),
    }
    // The losing owner stays on the identifier step with nothing applied.
    assert_eq!(second.current_step().await, SetupStep::Identifier);
    assert!(second.record().await.username.is_empty());
}
