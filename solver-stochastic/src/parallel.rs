//! Multi-threaded search.
//!
//! The calling thread coordinates: it owns the tree, the queue and the
//! incumbent, and hands out one node at a time to each idle worker. Workers
//! own their strategy objects and talk to the coordinator only through
//! channels. Each work item carries the incumbent value at dispatch time.

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::{SbbError, SbbResult};
use crate::model::{ScenarioSet, Solution};
use crate::params::SolverParameters;
use crate::search::{NodeProcessor, NodeReport, NodeWork, Partition, SearchLimits, SearchTree};

/// Coordinator to worker.
enum Command {
    Process(Box<NodeWork>),
    Stop,
}

/// Worker to coordinator.
struct Report {
    rank: usize,
    result: SbbResult<NodeReport>,
}

fn worker_loop(mut processor: NodeProcessor, commands: Receiver<Command>, reports: Sender<Report>) {
    let rank = processor.rank();
    log::debug!("Worker {} started", rank);
    while let Ok(command) = commands.recv() {
        match command {
            Command::Process(work) => {
                let result = processor.process(*work);
                if reports.send(Report { rank, result }).is_err() {
                    break;
                }
            }
            Command::Stop => break,
        }
    }
    log::debug!("Worker {} stopped", rank);
}

/// Run the search on `params.settings.workers` threads.
pub(crate) fn solve(
    params: &SolverParameters,
    scenarios: &ScenarioSet,
    limits: SearchLimits,
) -> SbbResult<Solution> {
    let workers = params.settings.workers.max(1);
    let mut processors = Vec::with_capacity(workers);
    for rank in 0..workers {
        processors.push(NodeProcessor::new(
            rank,
            scenarios.clone(),
            params.strategies()?,
            params.settings.clone(),
        ));
    }

    let mut tree = SearchTree::new(
        params.settings.clone(),
        limits,
        scenarios.root_bounds().clone(),
        Partition::full(scenarios),
    );

    let (report_tx, report_rx) = channel::unbounded::<Report>();

    std::thread::scope(|scope| {
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for processor in processors {
            let (tx, rx) = channel::unbounded::<Command>();
            let reports = report_tx.clone();
            handles.push(scope.spawn(move || worker_loop(processor, rx, reports)));
            senders.push(tx);
        }
        drop(report_tx);

        let result = coordinate(&mut tree, &senders, &report_rx);

        for tx in &senders {
            let _ = tx.send(Command::Stop);
        }
        for (rank, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() {
                return Err(SbbError::Worker {
                    rank,
                    message: "thread panicked".into(),
                });
            }
        }
        result
    })
}

/// Dispatch work until a termination condition holds and nothing is in
/// flight.
fn coordinate(
    tree: &mut SearchTree,
    workers: &[Sender<Command>],
    reports: &Receiver<Report>,
) -> SbbResult<Solution> {
    let mut idle: Vec<usize> = (0..workers.len()).rev().collect();
    let mut stopping = None;

    loop {
        if stopping.is_none() {
            stopping = tree.check_termination();
        }

        if stopping.is_none() {
            while let Some(&rank) = idle.last() {
                let Some(work) = tree.next_work() else {
                    break;
                };
                workers[rank]
                    .send(Command::Process(Box::new(work)))
                    .map_err(|_| SbbError::Worker {
                        rank,
                        message: "disconnected".into(),
                    })?;
                idle.pop();
            }
        }

        if tree.in_flight() == 0 {
            match stopping {
                // Reports drained while stopping may have changed the reason
                Some(reason) => {
                    let reason = tree.check_termination().unwrap_or(reason);
                    return Ok(tree.finalize(reason));
                }
                None => continue,
            }
        }

        let report = reports.recv().map_err(|_| SbbError::Worker {
            rank: usize::MAX,
            message: "all workers disconnected".into(),
        })?;
        idle.push(report.rank);
        let node_report = report.result?;
        tree.apply_report(node_report);
        tree.log_progress();
    }
}
