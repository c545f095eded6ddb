//! Consumed `WorkerPool` interface and the default host-provided
//! implementation. The discovery engine borrows a pool for the
//! duration of one run; workers own no state between genes beyond the
//! broadcast group context, keyed by run epoch to prevent cross-run
//! contamination (§4.1 "group context broadcast").

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::config::Method;
use crate::discovery::stats::{GeneStats, compute_one_vs_rest};
use crate::error::{CoreError, Result};

/// Per-cell group index table, broadcast once per run. `-1` means
/// "this cell is excluded from the grouping."
#[derive(Debug, Clone)]
pub struct GroupContext {
    pub epoch: u64,
    pub cell_to_group: Arc<Vec<i32>>,
    pub group_count: usize,
    pub min_cells: usize,
    pub method: Method,
}

#[derive(Debug, Clone)]
pub enum WorkerRequest {
    SetContext(GroupContext),
    ComputeGene {
        gene_index: usize,
        values: Vec<f32>,
    },
}

#[derive(Debug, Clone)]
pub enum WorkerResponse {
    Ack,
    GeneResult {
        gene_index: usize,
        stats: Vec<Option<GeneStats>>,
    },
    Error {
        gene_index: Option<usize>,
        message: String,
    },
}

/// Host-provided worker execution interface. `ThreadWorkerPool` is the
/// default: one OS thread per worker, bounded channels carrying owned
/// buffers — no shared mutable memory between workers.
pub trait WorkerPool: Send + Sync {
    fn init(&mut self) -> Result<()>;
    fn is_ready(&self) -> bool;
    fn size(&self) -> usize;

    /// Sends `request` to every worker and waits for all acks.
    fn broadcast(&self, request: WorkerRequest) -> Result<()>;

    /// Submits one gene for computation and blocks for the result, up
    /// to `timeout`. `None` timeout waits indefinitely.
    fn execute(&self, request: WorkerRequest, timeout: Option<Duration>) -> Result<WorkerResponse>;
}

/// A request paired with the one-shot channel its reply must land on.
/// Routing the reply this way (rather than through a shared per-worker
/// response channel) is what lets two dispatch threads safely collide
/// on the same worker index: each call's reply is only ever visible to
/// the call that sent it, never handed to whichever caller happens to
/// be blocked on `recv` first.
struct Envelope {
    request: WorkerRequest,
    reply: Sender<WorkerResponse>,
}

struct WorkerHandle {
    tx: Sender<Envelope>,
    join: Option<JoinHandle<()>>,
}

/// `std::thread` + `crossbeam_channel` worker pool. Each worker loops on
/// its request channel; `SetContext` replaces the worker's held context,
/// `ComputeGene` runs the one-vs-rest statistics and replies in place.
pub struct ThreadWorkerPool {
    workers: Vec<WorkerHandle>,
    next_worker: Mutex<usize>,
}

impl ThreadWorkerPool {
    pub fn new(n_workers: usize) -> Self {
        let n_workers = n_workers.max(1);
        let mut workers = Vec::with_capacity(n_workers);
        for _ in 0..n_workers {
            let (req_tx, req_rx) = bounded::<Envelope>(1);
            let join = std::thread::spawn(move || worker_loop(req_rx));
            workers.push(WorkerHandle {
                tx: req_tx,
                join: Some(join),
            });
        }
        Self {
            workers,
            next_worker: Mutex::new(0),
        }
    }

    fn pick_worker(&self) -> usize {
        let mut idx = self.next_worker.lock().expect("worker pool mutex poisoned");
        let chosen = *idx;
        *idx = (*idx + 1) % self.workers.len().max(1);
        chosen
    }
}

impl Default for ThreadWorkerPool {
    fn default() -> Self {
        Self::new(num_cpus::get().max(1))
    }
}

impl Drop for ThreadWorkerPool {
    fn drop(&mut self) {
        for worker in &mut self.workers {
            if let Some(handle) = worker.join.take() {
                drop(&worker.tx);
                let _ = handle.join();
            }
        }
    }
}

impl WorkerPool for ThreadWorkerPool {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_ready(&self) -> bool {
        !self.workers.is_empty()
    }

    fn size(&self) -> usize {
        self.workers.len()
    }

    fn broadcast(&self, request: WorkerRequest) -> Result<()> {
        let mut replies = Vec::with_capacity(self.workers.len());
        for worker in &self.workers {
            let (reply_tx, reply_rx) = bounded::<WorkerResponse>(1);
            worker
                .tx
                .send(Envelope {
                    request: request.clone(),
                    reply: reply_tx,
                })
                .map_err(|_| CoreError::ComputeFailed {
                    reason: "worker channel closed during broadcast".to_string(),
                    failed_genes: 0,
                    total_genes: 0,
                })?;
            replies.push(reply_rx);
        }
        for reply_rx in replies {
            match reply_rx.recv() {
                Ok(WorkerResponse::Ack) => {}
                Ok(WorkerResponse::Error { message, .. }) => {
                    return Err(CoreError::ComputeFailed {
                        reason: message,
                        failed_genes: 0,
                        total_genes: 0,
                    });
                }
                _ => {
                    return Err(CoreError::ComputeFailed {
                        reason: "unexpected response to broadcast".to_string(),
                        failed_genes: 0,
                        total_genes: 0,
                    });
                }
            }
        }
        Ok(())
    }

    fn execute(&self, request: WorkerRequest, timeout: Option<Duration>) -> Result<WorkerResponse> {
        let idx = self.pick_worker();
        let worker = &self.workers[idx];
        let (reply_tx, reply_rx) = bounded::<WorkerResponse>(1);
        worker
            .tx
            .send(Envelope { request, reply: reply_tx })
            .map_err(|_| CoreError::ComputeFailed {
                reason: "worker channel closed".to_string(),
                failed_genes: 1,
                total_genes: 1,
            })?;
        match timeout {
            Some(t) => match reply_rx.recv_timeout(t) {
                Ok(resp) => Ok(resp),
                Err(RecvTimeoutError::Timeout) => Err(CoreError::ComputeFailed {
                    reason: "gene compute timed out".to_string(),
                    failed_genes: 1,
                    total_genes: 1,
                }),
                Err(RecvTimeoutError::Disconnected) => Err(CoreError::ComputeFailed {
                    reason: "worker channel disconnected".to_string(),
                    failed_genes: 1,
                    total_genes: 1,
                }),
            },
            None => reply_rx.recv().map_err(|_| CoreError::ComputeFailed {
                reason: "worker channel disconnected".to_string(),
                failed_genes: 1,
                total_genes: 1,
            }),
        }
    }
}

fn worker_loop(rx: Receiver<Envelope>) {
    let mut context: Option<GroupContext> = None;
    while let Ok(Envelope { request, reply }) = rx.recv() {
        match request {
            WorkerRequest::SetContext(ctx) => {
                context = Some(ctx);
                if reply.send(WorkerResponse::Ack).is_err() {
                    return;
                }
            }
            WorkerRequest::ComputeGene { gene_index, values } => {
                let response = match &context {
                    Some(ctx) => WorkerResponse::GeneResult {
                        gene_index,
                        stats: compute_one_vs_rest(&values, &ctx.cell_to_group, ctx.group_count, ctx.min_cells, ctx.method),
                    },
                    None => WorkerResponse::Error {
                        gene_index: Some(gene_index),
                        message: "compute requested before context was broadcast".to_string(),
                    },
                };
                if reply.send(response).is_err() {
                    return;
                }
            }
        }
    }
}
