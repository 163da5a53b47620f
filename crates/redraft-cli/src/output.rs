//! Terminal and JSON rendering for plans and run outcomes.

use anyhow::Result;
use redraft_chunker::ChunkPlan;
use redraft_orchestrator::RunOutcome;
use serde::Serialize;

/// Characters of chunk text shown per line in the plan listing
const PREVIEW_MAX_LEN: usize = 60;

#[derive(Serialize)]
struct JsonPlan<'a> {
    fingerprint: &'a str,
    chunks: Vec<JsonChunk<'a>>,
}

#[derive(Serialize)]
struct JsonChunk<'a> {
    index: usize,
    token_estimate: usize,
    start: Option<usize>,
    end: Option<usize>,
    text: &'a str,
}

#[derive(Serialize)]
struct JsonRun<'a> {
    #[serde(flatten)]
    outcome: &'a RunOutcome,
    refined: Option<&'a str>,
}

pub fn format_plan(plan: &ChunkPlan, json: bool) -> Result<String> {
    if json {
        let output = JsonPlan {
            fingerprint: plan.fingerprint(),
            chunks: plan
                .chunks()
                .iter()
                .map(|c| JsonChunk {
                    index: c.index,
                    token_estimate: c.token_estimate,
                    start: c.source_span.as_ref().map(|s| s.start),
                    end: c.source_span.as_ref().map(|s| s.end),
                    text: &c.text,
                })
                .collect(),
        };
        return Ok(serde_json::to_string_pretty(&output)?);
    }

    let mut out = format!("{} chunk(s)\n", plan.len());
    for chunk in plan.chunks() {
        out.push_str(&format!(
            "\n[{}] ~{} tokens  {}",
            chunk.index,
            chunk.token_estimate,
            preview(&chunk.text, PREVIEW_MAX_LEN)
        ));
    }
    Ok(out)
}

pub fn format_outcome(outcome: &RunOutcome, refined: Option<&str>, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(&JsonRun { outcome, refined })?);
    }
    Ok(refined.unwrap_or(&outcome.text).to_string())
}

/// First line of `text`, cut to `max_len` characters.
fn preview(text: &str, max_len: usize) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    if line.chars().count() <= max_len {
        return line.to_string();
    }
    let cut: String = line.chars().take(max_len).collect();
    format!("{cut}...")
}
