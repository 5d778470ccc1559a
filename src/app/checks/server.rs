use crate::core::{Check, DoctorContext, Finding, Mode, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};

const NAME: &str = "server";
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// 啟動 dev server，確認能存活指定秒數後關閉
pub struct ServerCheck;

/// HTTP 探測：< 500 視為正常，>= 500 為錯誤，連不上為警告
pub async fn probe_http(client: &Client, url: &str) -> Finding {
    match client.get(url).send().await {
        Ok(response) if response.status().as_u16() < 500 => Finding::ok(
            NAME,
            "server.http",
            format!("GET {} returned {}", url, response.status()),
        ),
        Ok(response) => Finding::error(
            NAME,
            "server.http",
            format!("GET {} returned {}", url, response.status()),
        ),
        Err(e) => Finding::warning(NAME, "server.http", format!("GET {} failed: {}", url, e)),
    }
}

#[async_trait]
impl Check for ServerCheck {
    fn name(&self) -> &str {
        NAME
    }

    /// 診斷模式不佔用連接埠
    fn should_run(&self, ctx: &DoctorContext) -> bool {
        ctx.profile.server.enabled && ctx.mode != Mode::Diagnose
    }

    async fn diagnose(&self, ctx: &DoctorContext) -> Result<Vec<Finding>> {
        let server = &ctx.profile.server;
        let address = server.address();

        if !ctx.storage.exists(&ctx.profile.framework.manage_py).await {
            return Ok(vec![Finding::warning(
                NAME,
                "server.skipped",
                format!("{} not found, liveness probe skipped", ctx.profile.framework.manage_py),
            )]);
        }
        let Some(spec) = ctx.manage(&["runserver", address.as_str(), "--noreload"]) else {
            return Ok(vec![Finding::warning(
                NAME,
                "server.skipped",
                "No Python interpreter, liveness probe skipped",
            )]);
        };

        tracing::info!("🚀 Starting dev server on {} for {}s", address, server.hold_seconds);
        let mut process = ctx.runner.spawn(&spec).await?;

        let hold = Duration::from_secs(server.hold_seconds);
        let started = Instant::now();
        let mut alive = true;
        while started.elapsed() < hold {
            tokio::time::sleep(POLL_INTERVAL.min(hold)).await;
            if !process.is_alive().await? {
                alive = false;
                break;
            }
        }

        let mut findings = Vec::new();
        if alive {
            findings.push(Finding::ok(
                NAME,
                "server.alive",
                format!("Dev server stayed up for {}s on {}", server.hold_seconds, address),
            ));
            if server.http_check {
                let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
                findings.push(probe_http(&client, &server.probe_url()).await);
            }
        }

        let output = process.terminate().await?;
        if !alive {
            findings.push(Finding::error(
                NAME,
                "server.exited",
                format!(
                    "Dev server exited after {:.1}s:\n{}",
                    started.elapsed().as_secs_f32(),
                    output.tail(10)
                ),
            ));
        }

        Ok(findings)
    }

    async fn repair(&self, _ctx: &DoctorContext, _fixable: &[Finding]) -> Result<Vec<Finding>> {
        Ok(Vec::new())
    }
}
