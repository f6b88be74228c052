use clap::Args;
use serde::Serialize;

use relman::Operation;

use super::{CmdResult, GlobalArgs};
use crate::output::{exit_code_for_error, CliResponse};

#[derive(Args)]
pub struct QueueArgs {
    /// Operations to run in order: status, kill, clean, build, list, latest,
    /// auto[:kind], create[:kind]
    #[arg(required = true)]
    pub ops: Vec<String>,

    /// Keep running the remaining operations after one fails
    #[arg(long)]
    pub keep_going: bool,
}

#[derive(Serialize)]
pub struct QueueOutput {
    pub results: Vec<QueueEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped: Option<relman::queue::StopReport>,
}

#[derive(Serialize)]
pub struct QueueEntry {
    pub operation: String,
    #[serde(flatten)]
    pub response: CliResponse<serde_json::Value>,
}

pub fn run(args: QueueArgs, global: &GlobalArgs) -> CmdResult<QueueOutput> {
    // Parse everything up front; a typo must not leave half a queue running.
    let ops = args
        .ops
        .iter()
        .map(|s| s.parse::<Operation>())
        .collect::<relman::Result<Vec<_>>>()?;

    let session = global.session()?;
    let queue = session.queue();
    let handles: Vec<_> = ops.into_iter().map(|op| session.submit(&queue, op)).collect();

    let mut results = Vec::with_capacity(handles.len());
    let mut stopped = None;
    let mut exit_code = 0;

    for handle in handles {
        let outcome = handle.wait();
        let response = match outcome.result {
            Ok(data) => CliResponse::success(data),
            Err(err) => {
                if exit_code == 0 {
                    exit_code = exit_code_for_error(err.code);
                }
                if !args.keep_going && stopped.is_none() {
                    stopped = Some(queue.stop_all());
                }
                CliResponse::from_error(&err)
            }
        };
        results.push(QueueEntry {
            operation: outcome.operation,
            response,
        });
    }

    Ok((QueueOutput { results, stopped }, exit_code))
}
