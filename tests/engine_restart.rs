//! Engine state that must survive a restart on the same database file.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

use outreach_pipeline::clock::{Clock, ManualClock};
use outreach_pipeline::config::EngineConfig;
use outreach_pipeline::engine::{EngineDeps, EngineEvent, OutreachEngine};
use outreach_pipeline::error::{Error, GenerationError, RateLimitError};
use outreach_pipeline::generation::{GeneratedMessage, MessageGenerator};
use outreach_pipeline::leads::{CampaignLead, LeadStatus, OutreachMethod, TransitionRequest};
use outreach_pipeline::snapshot::CampaignSnapshot;
use outreach_pipeline::store::{Database, LibSqlBackend};
use outreach_pipeline::usage::LimitReason;

struct EchoGenerator;

#[async_trait]
impl MessageGenerator for EchoGenerator {
    async fn generate(
        &self,
        lead: &CampaignLead,
        channel: OutreachMethod,
        _is_follow_up: bool,
    ) -> Result<GeneratedMessage, GenerationError> {
        Ok(GeneratedMessage {
            text: format!("{} on {channel}", lead.business_name()),
            subject: None,
        })
    }
}

fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

async fn open(dir: &TempDir, clock: Arc<ManualClock>) -> Arc<OutreachEngine> {
    let config = EngineConfig {
        operator_id: "op-restart".into(),
        db_path: dir.path().join("outreach.db"),
        timezone: clock.timezone(),
        ..EngineConfig::default()
    };
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await.unwrap());
    OutreachEngine::new(
        &config,
        EngineDeps {
            db,
            clock,
            generator: Some(Arc::new(EchoGenerator)),
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn progress_survives_restart() {
    let dir = TempDir::new().unwrap();
    // 21:00 EDT on May 20.
    let clock = Arc::new(ManualClock::new(
        at("2026-05-21T01:00:00Z"),
        chrono_tz::America::New_York,
    ));

    let engine = open(&dir, clock.clone()).await;
    let mut events = engine.subscribe();

    let snapshot: CampaignSnapshot = serde_json::from_str(
        r#"{
            "name": "Restart",
            "leads": [
                { "business_name": "Harbor Bakery", "email": "hi@harbor.example" },
                { "business_name": "Rye & Co", "status": "responded",
                  "outreach_method": "instagram", "last_contacted_at": "2026-05-18T15:00:00Z" },
                { "business_name": "Crust", "status": "responded",
                  "outreach_method": "email", "last_contacted_at": "2026-05-17T15:00:00Z" }
            ]
        }"#,
    )
    .unwrap();
    engine.import(snapshot).await.unwrap();

    let harbor = engine
        .leads()
        .await
        .into_iter()
        .find(|l| l.business_name() == "Harbor Bakery")
        .unwrap();

    engine
        .generate_message(harbor.id, OutreachMethod::Email)
        .await
        .unwrap();
    engine
        .transition(harbor.id, TransitionRequest::contacted(OutreachMethod::Email))
        .await
        .unwrap();
    assert!(engine.complete_todo("bulk_responded").await.unwrap());

    let mut saw_usage = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, EngineEvent::UsageRecorded { lead_id, .. } if lead_id == harbor.id) {
            saw_usage = true;
        }
    }
    assert!(saw_usage);
    drop(engine);

    // Same local day, fresh process.
    clock.advance(Duration::hours(1));
    let engine = open(&dir, clock.clone()).await;

    let reloaded = engine.lead(harbor.id).await.unwrap();
    assert_eq!(reloaded.status, LeadStatus::Contacted);
    assert_eq!(reloaded.outreach_method, Some(OutreachMethod::Email));

    let board = engine.todos().await;
    assert!(board.find("bulk_responded").is_some());
    assert!(board.pending.iter().all(|t| t.id != "bulk_responded"));
    assert_eq!(engine.usage().await.unwrap().daily.used, 1);

    let err = engine
        .generate_message(harbor.id, OutreachMethod::Email)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::RateLimit(RateLimitError::Exceeded {
            reason: LimitReason::MethodLimit,
            ..
        })
    ));
    drop(engine);

    // Past local midnight the day starts over.
    clock.advance(Duration::hours(4));
    let engine = open(&dir, clock).await;
    let board = engine.todos().await;
    assert!(board.completed.is_empty());
    assert_eq!(engine.usage().await.unwrap().daily.used, 0);
    engine
        .generate_message(harbor.id, OutreachMethod::Email)
        .await
        .unwrap();
}
