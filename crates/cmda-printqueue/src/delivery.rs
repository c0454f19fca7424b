//! Job dispatch to connected print agents.
//!
//! Agents are tried most-recently-connected first: a freshly reconnected
//! agent is the one most likely to actually be online. The first
//! acknowledgement wins; unacknowledged jobs stay queued for the next
//! pass or the next agent connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use cmda_schemas::print::PrintJob;

use crate::{PrintQueue, QueueError};

/// A connected print agent as seen by the dispatcher.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    pub agent_id: String,
    pub company_id: String,
    /// Stores this agent prints for; empty means every store of the company.
    pub store_ids: Vec<String>,
    pub connected_at_utc: DateTime<Utc>,
}

impl AgentHandle {
    fn covers(&self, job: &PrintJob) -> bool {
        if self.company_id != job.company_id {
            return false;
        }
        match &job.target_store_id {
            Some(store) => self.store_ids.is_empty() || self.store_ids.iter().any(|s| s == store),
            None => true,
        }
    }
}

/// Transport seam between the dispatcher and whatever carries jobs to
/// agents (a socket layer in production, a script in tests).
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn connected_agents(&self, company_id: &str) -> Vec<AgentHandle>;

    /// Push a job to one agent; `true` means the agent acknowledged within
    /// `timeout`.
    async fn request_print(&self, agent: &AgentHandle, job: &PrintJob, timeout: Duration) -> bool;
}

#[async_trait]
impl<T: AgentTransport + ?Sized> AgentTransport for Arc<T> {
    async fn connected_agents(&self, company_id: &str) -> Vec<AgentHandle> {
        (**self).connected_agents(company_id).await
    }

    async fn request_print(&self, agent: &AgentHandle, job: &PrintJob, timeout: Duration) -> bool {
        (**self).request_print(agent, job, timeout).await
    }
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub ack_timeout: Duration,
    /// Back-off between extra passes over jobs still pending.
    pub retry_delays: Vec<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            ack_timeout: Duration::from_secs(10),
            retry_delays: vec![Duration::from_secs(1), Duration::from_secs(2)],
        }
    }
}

/// Ids of jobs delivered and jobs still queued after a dispatch round.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub delivered: Vec<String>,
    pub pending: Vec<String>,
}

pub struct Dispatcher<T> {
    queue: Arc<PrintQueue>,
    transport: T,
    config: DispatchConfig,
}

impl<T: AgentTransport> Dispatcher<T> {
    pub fn new(queue: Arc<PrintQueue>, transport: T, config: DispatchConfig) -> Self {
        Dispatcher {
            queue,
            transport,
            config,
        }
    }

    /// One pass over a company's pending jobs.
    pub async fn process_company(&self, company_id: &str) -> Result<DeliveryReport, QueueError> {
        let jobs = self.queue.pending_for_company(company_id).await;
        if jobs.is_empty() {
            return Ok(DeliveryReport::default());
        }

        let mut agents = self.transport.connected_agents(company_id).await;
        agents.sort_by(|a, b| b.connected_at_utc.cmp(&a.connected_at_utc));

        let mut report = DeliveryReport::default();
        for job in jobs {
            if self.deliver_one(&agents, &job).await? {
                report.delivered.push(job.id);
            } else {
                report.pending.push(job.id);
            }
        }
        if !report.pending.is_empty() {
            debug!(
                company_id,
                pending = report.pending.len(),
                "jobs left queued after dispatch pass"
            );
        }
        Ok(report)
    }

    /// Dispatch with the configured back-off passes; stops early once
    /// nothing is pending.
    pub async fn process_with_retry(&self, company_id: &str) -> Result<DeliveryReport, QueueError> {
        let mut report = self.process_company(company_id).await?;
        for delay in &self.config.retry_delays {
            if report.pending.is_empty() {
                break;
            }
            tokio::time::sleep(*delay).await;
            let next = self.process_company(company_id).await?;
            report.delivered.extend(next.delivered);
            report.pending = next.pending;
        }
        if !report.pending.is_empty() {
            warn!(
                company_id,
                pending = report.pending.len(),
                "jobs still pending after all retry passes"
            );
        }
        Ok(report)
    }

    async fn deliver_one(&self, agents: &[AgentHandle], job: &PrintJob) -> Result<bool, QueueError> {
        for agent in agents.iter().filter(|a| a.covers(job)) {
            if self
                .transport
                .request_print(agent, job, self.config.ack_timeout)
                .await
            {
                self.queue.mark_delivered(&job.id).await?;
                info!(job_id = %job.id, agent_id = %agent.agent_id, "print job delivered");
                return Ok(true);
            }
            debug!(job_id = %job.id, agent_id = %agent.agent_id, "agent did not acknowledge");
        }
        Ok(false)
    }
}
