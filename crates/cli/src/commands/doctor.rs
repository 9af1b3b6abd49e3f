use gemba_core::config::{AppConfig, LoadOptions};
use gemba_db::connect_with_settings;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_outbound_channels(&config));
            checks.push(check_work_order_bridge(&config));
            checks.push(check_database_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["outbound_channels", "work_order_bridge", "database_connectivity"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_ok = checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if all_ok { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_ok {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_outbound_channels(config: &AppConfig) -> DoctorCheck {
    let mut channels = Vec::new();
    if config.notifier.email_webhook_url.is_some() {
        channels.push("email");
    }
    if config.notifier.chat_webhook_url.is_some() {
        channels.push("chat");
    }

    let details = if channels.is_empty() {
        "no webhooks configured; notifications run in noop mode".to_string()
    } else {
        format!("configured channels: {}", channels.join(", "))
    };
    DoctorCheck { name: "outbound_channels", status: CheckStatus::Pass, details }
}

fn check_work_order_bridge(config: &AppConfig) -> DoctorCheck {
    let details = if config.cmms.enabled {
        match &config.cmms.base_url {
            Some(base_url) => format!("bridge enabled against `{base_url}`"),
            None => "bridge enabled but no base url is set".to_string(),
        }
    } else {
        "bridge disabled; work orders use the in-process stand-in".to_string()
    };

    let status = if config.cmms.enabled && config.cmms.base_url.is_none() {
        CheckStatus::Fail
    } else {
        CheckStatus::Pass
    };
    DoctorCheck { name: "work_order_bridge", status, details }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
