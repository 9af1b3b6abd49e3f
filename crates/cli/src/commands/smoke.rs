use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::commands::CommandResult;
use gemba_cmms::{InMemoryWorkOrderSystem, SyncAdapter};
use gemba_core::config::{AppConfig, LoadOptions};
use gemba_core::domain::grant::{ApprovalGrant, ApprovalLevel, GrantId, PersonId};
use gemba_core::domain::scope::UnitScope;
use gemba_core::domain::ticket::TicketStatus;
use gemba_core::workflow::{ActionPayload, ActionType};
use gemba_db::repositories::{
    GrantRepository, InMemoryContactRepository, InMemoryGrantRepository,
    InMemoryTicketNumberRepository, InMemoryTicketRepository, InMemoryWorkOrderLinkRepository,
};
use gemba_db::{connect_with_settings, migrations};
use gemba_engine::{ApprovalRegistry, CreateTicketRequest, RecipientResolver, WorkflowOrchestrator};
use gemba_notify::{NoopNotifier, NotificationDispatcher, TaskQueue};
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("channel_sanity"));
            checks.push(skipped("db_connectivity"));
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_lifecycle"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let channel_check_started = Instant::now();
    let chat_configured = config.notifier.chat_webhook_url.is_some();
    let chat_token_ok = !chat_configured
        || config
            .notifier
            .chat_bot_token
            .as_ref()
            .map(|token| !token.expose_secret().trim().is_empty())
            .unwrap_or(false);
    checks.push(SmokeCheck {
        name: "channel_sanity",
        status: if chat_token_ok { SmokeStatus::Pass } else { SmokeStatus::Fail },
        elapsed_ms: channel_check_started.elapsed().as_millis() as u64,
        message: if !chat_configured {
            "no chat channel configured; chat sends will be skipped".to_string()
        } else if chat_token_ok {
            "chat webhook and bot token are present".to_string()
        } else {
            "chat webhook is configured but the bot token is empty".to_string()
        },
    });

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_lifecycle"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let db_started = Instant::now();
    let db_result = runtime.block_on(async {
        connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
    });

    let pool = match db_result {
        Ok(pool) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Pass,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: format!("connected using `{}`", config.database.url),
            });
            pool
        }
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: format!("failed to connect: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_lifecycle"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let migration_started = Instant::now();
    let migration_result = runtime.block_on(async { migrations::run_pending(&pool).await });
    runtime.block_on(async {
        pool.close().await;
    });

    match migration_result {
        Ok(()) => checks.push(SmokeCheck {
            name: "migration_visibility",
            status: SmokeStatus::Pass,
            elapsed_ms: migration_started.elapsed().as_millis() as u64,
            message: "migrations are visible and executable".to_string(),
        }),
        Err(error) => checks.push(SmokeCheck {
            name: "migration_visibility",
            status: SmokeStatus::Fail,
            elapsed_ms: migration_started.elapsed().as_millis() as u64,
            message: format!("migration execution failed: {error}"),
        }),
    }

    let lifecycle_started = Instant::now();
    match runtime.block_on(walk_lifecycle()) {
        Ok(message) => checks.push(SmokeCheck {
            name: "workflow_lifecycle",
            status: SmokeStatus::Pass,
            elapsed_ms: lifecycle_started.elapsed().as_millis() as u64,
            message,
        }),
        Err(message) => checks.push(SmokeCheck {
            name: "workflow_lifecycle",
            status: SmokeStatus::Fail,
            elapsed_ms: lifecycle_started.elapsed().as_millis() as u64,
            message,
        }),
    }

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

/// Walks one ticket through the whole lifecycle against in-memory
/// repositories: accept, plan, start, finish, review, and a creator close.
/// Exercises the guard table, the version counter, and the background
/// queue without touching the configured database.
async fn walk_lifecycle() -> Result<String, String> {
    let grants = Arc::new(InMemoryGrantRepository::default());
    grants
        .save(ApprovalGrant {
            id: GrantId("smoke-grant".to_string()),
            person_id: PersonId("smoke-approver".to_string()),
            level: ApprovalLevel::L4,
            scope: UnitScope::plant("SMOKE"),
        })
        .await
        .map_err(|error| format!("failed to seed approval grant: {error}"))?;

    let registry = Arc::new(ApprovalRegistry::new(grants));
    let resolver = Arc::new(RecipientResolver::new(
        registry.clone(),
        Arc::new(InMemoryContactRepository::default()),
    ));
    let dispatcher =
        Arc::new(NotificationDispatcher::new(Arc::new(NoopNotifier), Duration::from_millis(0)));
    let sync = Arc::new(SyncAdapter::new(
        Arc::new(InMemoryWorkOrderSystem::default()),
        Arc::new(InMemoryWorkOrderLinkRepository::default()),
    ));
    let queue = Arc::new(TaskQueue::default());
    let orchestrator = WorkflowOrchestrator::new(
        Arc::new(InMemoryTicketRepository::default()),
        Arc::new(InMemoryTicketNumberRepository::default()),
        registry,
        resolver,
        dispatcher,
        sync,
        queue.clone(),
    );

    let creator = PersonId("smoke-creator".to_string());
    let approver = PersonId("smoke-approver".to_string());

    let mut ticket = orchestrator
        .create_ticket(CreateTicketRequest {
            unit_scope: UnitScope::plant("SMOKE"),
            created_by: creator.clone(),
            description: Some("smoke lifecycle walk".to_string()),
        })
        .await
        .map_err(|error| format!("create failed: {error}"))?;

    let steps = [
        (ActionType::Accept, &approver, ActionPayload::default()),
        (
            ActionType::Plan,
            &approver,
            ActionPayload { assignee: Some(approver.clone()), ..ActionPayload::default() },
        ),
        (ActionType::Start, &approver, ActionPayload::default()),
        (ActionType::Finish, &approver, ActionPayload::default()),
        (ActionType::ApproveReview, &approver, ActionPayload::default()),
        (ActionType::ApproveClose, &creator, ActionPayload::default()),
    ];
    for (action, actor, payload) in steps {
        ticket = orchestrator
            .perform_action(&ticket.id, action, actor, payload)
            .await
            .map_err(|error| format!("`{action}` failed: {error}"))?;
    }

    queue.drain(Duration::from_secs(2)).await;

    if ticket.status != TicketStatus::Closed {
        return Err(format!("expected a closed ticket, got `{}`", ticket.status));
    }

    Ok(format!(
        "ticket {} walked open to closed in {} transitions",
        ticket.ticket_number, ticket.version
    ))
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
