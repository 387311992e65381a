use serde::Deserialize;

use clipforge_jobs::{Job, JobView};
use clipforge_ledger::LedgerEntry;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub user_prompt: String,
    pub template_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemixJobRequest {
    pub user_prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn job_to_json(job: Job) -> serde_json::Value {
    serde_json::json!({
        "id": job.id.to_string(),
        "status": job.status.as_str(),
        "kind": job.kind.as_str(),
        "prompt": job.prompt,
        "result_url": job.result_ref,
        "progress": job.progress,
        "cost": job.cost,
        "parent_id": job.parent_ref.map(|p| p.to_string()),
        "error": job.error,
        "created_at": job.created_at.to_rfc3339(),
        "updated_at": job.updated_at.to_rfc3339(),
    })
}

pub fn view_to_json(view: JobView) -> serde_json::Value {
    let mut body = serde_json::json!({
        "id": view.id.to_string(),
        "status": view.status.as_str(),
        "result_url": view.result_ref,
        "progress": view.progress,
        "error": view.error,
    });
    if let Some(warning) = view.warning {
        body["warning"] = serde_json::Value::String(warning);
    }
    body
}

pub fn entry_to_json(entry: LedgerEntry) -> serde_json::Value {
    serde_json::json!({
        "id": entry.id.to_string(),
        "delta": entry.delta,
        "reason": entry.reason.as_str(),
        "job_id": entry.job_ref.map(|j| j.to_string()),
        "event_ref": entry.event_ref,
        "receipt": entry.receipt,
        "created_at": entry.created_at.to_rfc3339(),
    })
}
