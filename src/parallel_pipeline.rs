// THEORY:
// One segmentation run is strictly sequential, but separate images share nothing.
// The `ParallelSegmenter` exploits that: it owns a pool of workers, hands each
// incoming grid to the next worker round-robin, and lets every worker run the
// ordinary sequential driver on its own grid. Each partition still has exactly one
// writer; only whole runs overlap.
//
// The driver is CPU-bound, so workers run it through `spawn_blocking` instead of
// on the async executor threads. Results travel back over a `oneshot` per task.
//
// Both `WorkerPool::new` and `ParallelSegmenter::new` spawn tasks and must be
// called from inside a Tokio runtime.

use crate::core_modules::error::{Result, SegmentationError};
use crate::core_modules::pixel_grid::PixelGrid;
use crate::pipeline::{Segmentation, SegmentationConfig, SegmentationPipeline};
use futures::future::join_all;
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};

pub struct SegmentTask {
    pub grid: PixelGrid,
    pub task_id: u64,
    pub result_sender: oneshot::Sender<Result<Segmentation>>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<SegmentTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
    next_task_id: AtomicU64,
}

impl WorkerPool {
    pub fn new(config: SegmentationConfig, worker_count: usize) -> Result<Self> {
        let worker_count = worker_count.max(1);
        let pipeline = Arc::new(SegmentationPipeline::new(config)?);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<SegmentTask>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<SegmentTask>())
            .unzip();

        // Dispatcher: round-robin over the workers.
        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        let mut workers = Vec::with_capacity(worker_count);
        for (worker_idx, mut worker_receiver) in worker_receivers.into_iter().enumerate() {
            let pipeline = Arc::clone(&pipeline);
            let worker = tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    debug!("worker {worker_idx} segmenting task {}", task.task_id);
                    let pipeline = Arc::clone(&pipeline);
                    let grid = task.grid;
                    let result = tokio::task::spawn_blocking(move || pipeline.segment(grid))
                        .await
                        .unwrap_or_else(|join_error| {
                            Err(SegmentationError::Worker(format!(
                                "segmentation task {} failed: {join_error}",
                                task.task_id
                            )))
                        });
                    let _ = task.result_sender.send(result);
                }
            });
            workers.push(worker);
        }

        Ok(Self {
            task_sender,
            workers,
            next_task_id: AtomicU64::new(0),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub async fn segment(&self, grid: PixelGrid) -> Result<Segmentation> {
        let (result_sender, result_receiver) = oneshot::channel();
        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);

        self.task_sender
            .send(SegmentTask {
                grid,
                task_id,
                result_sender,
            })
            .map_err(|_| SegmentationError::Worker("failed to send task to worker pool".to_string()))?;

        result_receiver
            .await
            .map_err(|_| SegmentationError::Worker("failed to receive result from worker".to_string()))?
    }

    /// Closes the task queue and waits for every worker to drain.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Segments many independent grids concurrently, one sequential run per grid.
pub struct ParallelSegmenter {
    worker_pool: WorkerPool,
}

impl ParallelSegmenter {
    /// One worker per logical CPU.
    pub fn new(config: SegmentationConfig) -> Result<Self> {
        Self::with_workers(config, num_cpus::get())
    }

    pub fn with_workers(config: SegmentationConfig, worker_count: usize) -> Result<Self> {
        Ok(Self {
            worker_pool: WorkerPool::new(config, worker_count)?,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_pool.worker_count()
    }

    pub async fn segment(&self, grid: PixelGrid) -> Result<Segmentation> {
        self.worker_pool.segment(grid).await
    }

    /// Results come back in the same order as `grids`.
    pub async fn segment_all(&self, grids: Vec<PixelGrid>) -> Vec<Result<Segmentation>> {
        join_all(grids.into_iter().map(|grid| self.worker_pool.segment(grid))).await
    }

    pub async fn shutdown(self) {
        self.worker_pool.shutdown().await;
    }
}
