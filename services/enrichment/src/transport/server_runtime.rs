use std::{
    net::{TcpListener, TcpStream},
    sync::{Arc, Mutex, mpsc},
    time::{Duration, Instant},
};

use super::{
    SOCKET_TIMEOUT_SECS, SharedRuntime,
    http::{write_backpressure_response, write_response},
    request::read_http_request,
    routes::handle_request,
};

const QUEUE_CAPACITY_PER_WORKER: usize = 64;

type ConnectionQueue = Arc<Mutex<mpsc::Receiver<TcpStream>>>;

pub(super) fn serve_http_with_workers(
    runtime: SharedRuntime,
    bind_addr: &str,
    worker_count: usize,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr)?;
    let worker_count = worker_count.max(1);
    let queue_capacity = worker_count.saturating_mul(QUEUE_CAPACITY_PER_WORKER);
    let (tx, rx) = mpsc::sync_channel::<TcpStream>(queue_capacity);
    let queue: ConnectionQueue = Arc::new(Mutex::new(rx));
    tracing::info!(bind_addr, worker_count, queue_capacity, "skill transport started");

    std::thread::scope(|scope| {
        for worker in 0..worker_count {
            let runtime = Arc::clone(&runtime);
            let queue = Arc::clone(&queue);
            scope.spawn(move || run_worker(worker, &runtime, &queue));
        }
        admit_connections(&listener, &runtime, &tx);
        drop(tx);
    });

    Ok(())
}

/// Hands accepted sockets to the workers. A full queue is answered with 503
/// on the accepting thread instead of blocking `accept`.
fn admit_connections(
    listener: &TcpListener,
    runtime: &SharedRuntime,
    queue: &mpsc::SyncSender<TcpStream>,
) {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(%err, "skill transport accept error");
                continue;
            }
        };
        match queue.try_send(stream) {
            Ok(()) => {}
            Err(mpsc::TrySendError::Full(stream)) => {
                runtime.observe_backpressure_rejection();
                if let Err(err) = write_backpressure_response(stream, SOCKET_TIMEOUT_SECS) {
                    tracing::warn!(%err, "skill transport backpressure response failed");
                }
            }
            Err(mpsc::TrySendError::Disconnected(_)) => {
                tracing::error!("skill transport worker queue closed");
                return;
            }
        }
    }
}

fn run_worker(worker: usize, runtime: &SharedRuntime, queue: &ConnectionQueue) {
    loop {
        let next = match queue.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => {
                tracing::error!(worker, "skill transport queue lock poisoned");
                return;
            }
        };
        let Ok(stream) = next else {
            return;
        };
        if let Err(err) = serve_connection(runtime, stream) {
            tracing::warn!(worker, %err, "skill transport connection error");
        }
    }
}

fn serve_connection(runtime: &SharedRuntime, mut stream: TcpStream) -> std::io::Result<()> {
    let timeout = Some(Duration::from_secs(SOCKET_TIMEOUT_SECS));
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;

    let started = Instant::now();
    let request = match read_http_request(&mut stream) {
        Ok(Some(request)) => request,
        Ok(None) => return Ok(()),
        Err(err) => {
            tracing::debug!(%err, "skill transport rejected request head");
            return write_response(&mut stream, err.response());
        }
    };

    let response = handle_request(runtime, &request);
    tracing::debug!(
        method = %request.method,
        target = %request.target,
        status = response.status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "skill transport request served"
    );
    write_response(&mut stream, response)
}
