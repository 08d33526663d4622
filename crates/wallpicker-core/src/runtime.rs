//! Dedicated event-loop thread
//!
//! [`CoreRuntime`] runs a current-thread tokio runtime on its own OS thread and
//! owns the [`CoreContext`] there. Any thread can submit a [`Request`]; every
//! request gets a ticket and exactly one [`Completion`] carrying that ticket,
//! delivered on a plain `std::sync::mpsc` queue that the owning thread (a UI
//! loop, typically) drains whenever it likes. Only finished values cross the
//! queue, never futures or runtime handles.
//!
//! Requests that arrive after shutdown begins, or that are still queued or
//! running when it ends, complete with a shutdown error.

use crate::config::CoreConfig;
use crate::context::CoreContext;
use crate::descriptor::{LocalDescriptor, Locator, RemoteDescriptor};
use crate::error::{CoreError, FetchError, Result};
use crate::pipeline::FetchOutcome;
use crate::scanner::ScanPage;
use crate::source::{RemoteSource, SearchPage};
use blob_store::SweepReport;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use wallhaven_client::SearchQuery;

pub type Ticket = u64;

/// How long shutdown waits for requests still being handled
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub enum Request {
    Fetch {
        source: Locator,
        timeout: Option<Duration>,
    },
    Peek {
        source: Locator,
    },
    EvictNow,
    ScanPage {
        root: PathBuf,
        offset: usize,
        limit: usize,
    },
    Search {
        query: SearchQuery,
    },
    SearchLocal {
        query: String,
    },
    Download {
        wallpaper: RemoteDescriptor,
    },
    TrashLocal {
        path: PathBuf,
    },
}

#[derive(Debug)]
pub enum Response {
    Fetched(std::result::Result<FetchOutcome, FetchError>),
    Peeked(bool),
    Evicted(Result<SweepReport>),
    Scanned(Result<ScanPage>),
    Searched(std::result::Result<SearchPage, FetchError>),
    LocalSearched(Result<Vec<LocalDescriptor>>),
    Downloaded(Result<PathBuf>),
    Trashed(Result<bool>),
}

impl Response {
    /// The answer to `request` once the runtime has stopped
    fn stopped(request: &Request) -> Self {
        let stopped = || CoreError::Fetch(FetchError::Shutdown);
        match request {
            Request::Fetch { .. } => Response::Fetched(Err(FetchError::Shutdown)),
            Request::Peek { .. } => Response::Peeked(false),
            Request::EvictNow => Response::Evicted(Err(stopped())),
            Request::ScanPage { .. } => Response::Scanned(Err(stopped())),
            Request::Search { .. } => Response::Searched(Err(FetchError::Shutdown)),
            Request::SearchLocal { .. } => Response::LocalSearched(Err(stopped())),
            Request::Download { .. } => Response::Downloaded(Err(stopped())),
            Request::TrashLocal { .. } => Response::Trashed(Err(stopped())),
        }
    }
}

#[derive(Debug)]
pub struct Completion {
    pub ticket: Ticket,
    pub response: Response,
}

pub struct CoreRuntime {
    requests: mpsc::UnboundedSender<(Ticket, Request)>,
    completions: std_mpsc::Receiver<Completion>,
    completion_tx: std_mpsc::Sender<Completion>,
    next_ticket: AtomicU64,
    stop: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl CoreRuntime {
    /// Start the loop thread and initialise the context on it
    ///
    /// Returns once the context is ready, or with its init error.
    pub fn start(config: CoreConfig, remote: Arc<dyn RemoteSource>) -> Result<Self> {
        let runtime = build_runtime(&config)?;

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = std_mpsc::channel();
        let loop_completions = completion_tx.clone();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
        let stop = CancellationToken::new();
        let loop_stop = stop.clone();

        let thread = std::thread::Builder::new()
            .name("wallpicker-core".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let context = match CoreContext::init(config, remote).await {
                        Ok(context) => Arc::new(context),
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));
                    event_loop(context, request_rx, loop_completions, loop_stop).await;
                });
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(CoreError::Config(
                    "Core thread exited during startup".to_string(),
                ));
            }
        }
        info!("Core runtime started");

        Ok(Self {
            requests: request_tx,
            completions: completion_rx,
            completion_tx,
            next_ticket: AtomicU64::new(1),
            stop,
            thread: Some(thread),
        })
    }

    /// Queue a request; its completion will carry the returned ticket
    pub fn submit(&self, request: Request) -> Ticket {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        if let Err(mpsc::error::SendError((ticket, request))) = self.requests.send((ticket, request))
        {
            debug!(ticket, "Core runtime is stopped, answering with shutdown");
            let _ = self.completion_tx.send(Completion {
                ticket,
                response: Response::stopped(&request),
            });
        }
        ticket
    }

    /// Every completion that is ready now, without blocking
    pub fn try_completions(&self) -> Vec<Completion> {
        self.completions.try_iter().collect()
    }

    /// Block up to `timeout` for the next completion
    pub fn recv_completion(&self, timeout: Duration) -> Option<Completion> {
        self.completions.recv_timeout(timeout).ok()
    }

    /// Stop the loop, fail pending fetches and join the thread
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Core thread panicked");
            }
            info!("Core runtime stopped");
        }
    }
}

impl Drop for CoreRuntime {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

/// Current-thread runtime whose blocking pool has room for every scan worker
/// and every fetch slot, so walks never starve store I/O
fn build_runtime(config: &CoreConfig) -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .max_blocking_threads(config.scan_workers.max(1) + config.fetch_concurrency.max(1))
        .thread_name("wallpicker-core-blocking")
        .build()
}

async fn event_loop(
    context: Arc<CoreContext>,
    mut requests: mpsc::UnboundedReceiver<(Ticket, Request)>,
    completions: std_mpsc::Sender<Completion>,
    stop: CancellationToken,
) {
    let handlers = TaskTracker::new();
    let abandon = CancellationToken::new();

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            next = requests.recv() => {
                let Some((ticket, request)) = next else {
                    break;
                };
                let context = Arc::clone(&context);
                let completions = completions.clone();
                let abandon = abandon.clone();
                handlers.spawn(async move {
                    let stopped = Response::stopped(&request);
                    let response = tokio::select! {
                        response = handle(&context, request) => response,
                        _ = abandon.cancelled() => stopped,
                    };
                    if completions.send(Completion { ticket, response }).is_err() {
                        debug!(ticket, "Completion receiver gone");
                    }
                });
            }
        }
    }

    // later submits fail at send and are answered by the submitter
    requests.close();
    let mut refused = 0usize;
    while let Ok((ticket, request)) = requests.try_recv() {
        refused += 1;
        let response = Response::stopped(&request);
        if completions.send(Completion { ticket, response }).is_err() {
            debug!(ticket, "Completion receiver gone");
        }
    }
    if refused > 0 {
        debug!(refused, "Answered queued requests with shutdown");
    }

    context.shutdown().await;
    handlers.close();
    if tokio::time::timeout(DRAIN_TIMEOUT, handlers.wait())
        .await
        .is_err()
    {
        warn!(
            pending = handlers.len(),
            "Abandoning requests still running at shutdown"
        );
        abandon.cancel();
        handlers.wait().await;
    }
}

async fn handle(context: &CoreContext, request: Request) -> Response {
    match request {
        Request::Fetch { source, timeout } => {
            Response::Fetched(context.fetch(&source, timeout).await)
        }
        Request::Peek { source } => Response::Peeked(context.peek(&source).await),
        Request::EvictNow => Response::Evicted(context.evict_now().await),
        Request::ScanPage {
            root,
            offset,
            limit,
        } => Response::Scanned(context.scan_page(root, offset, limit).await),
        Request::Search { query } => Response::Searched(context.search(&query).await),
        Request::SearchLocal { query } => {
            Response::LocalSearched(context.search_local(&query).await)
        }
        Request::Download { wallpaper } => {
            Response::Downloaded(context.download_wallpaper(&wallpaper).await)
        }
        Request::TrashLocal { path } => Response::Trashed(context.trash_local(&path).await),
    }
}
