// src/prober.rs
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::Arc;
use std::time::Duration;
use log::Level;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{ timeout_at, Instant };
use tokio_util::sync::CancellationToken;
use crate::config::Config;
use crate::models::server::{ Endpoint, ServerRecord };
use crate::protocol::status::{ build_status_query, parse_status_reply };
use crate::report::Reporter;
use crate::utils::{ bind_ephemeral, DiscoveryError };

const TARGET: &str = "serverscout::prober";

const MAX_DATAGRAM: usize = 65536;

#[derive(Debug, Clone, Copy)]
struct ProbeRequest {
    endpoint: Endpoint,
    timeout: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub attempted: usize,
    pub produced: usize,
    pub cancelled: bool,
}

struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(current: &Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(current.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Sends one status query per endpoint, at most `max_concurrent` at a time.
/// The bound keeps bursts of queries from overrunning home router queues.
pub struct StatusProber {
    max_concurrent: usize,
    timeout: Duration,
    reporter: Arc<dyn Reporter>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl StatusProber {
    pub fn new(config: &Config, reporter: Arc<dyn Reporter>) -> Self {
        Self::with_limits(config.probe_concurrency(), config.probe_timeout(), reporter)
    }

    pub fn with_limits(max_concurrent: usize, timeout: Duration, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            timeout,
            reporter,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous probes seen during the last run.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Probes every endpoint and hands each parsed record to `on_record` as
    /// soon as it arrives, in completion order. Endpoints that time out or
    /// answer with garbage are dropped. On cancellation in-flight probes are
    /// aborted and no further records are delivered.
    pub async fn probe_servers<F>(
        &self,
        endpoints: Vec<Endpoint>,
        mut on_record: F,
        cancel: &CancellationToken
    ) -> ProbeSummary
        where F: FnMut(ServerRecord)
    {
        self.peak_in_flight.store(0, Ordering::SeqCst);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut pending = endpoints.into_iter().peekable();
        let mut tasks: JoinSet<Option<ServerRecord>> = JoinSet::new();
        let mut summary = ProbeSummary::default();

        loop {
            let more = pending.peek().is_some();
            if !more && tasks.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    tasks.shutdown().await;
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    match joined {
                        Ok(Some(record)) => {
                            summary.produced += 1;
                            on_record(record);
                        }
                        Ok(None) => {}
                        Err(e) if e.is_panic() => {
                            self.reporter.report(TARGET, Level::Error, format_args!("Probe task panicked: {}", e));
                        }
                        Err(_) => {}
                    }
                }
                permit = semaphore.clone().acquire_owned(), if more => {
                    let permit = match permit {
                        Ok(p) => p,
                        Err(_) => break,
                    };
                    if let Some(endpoint) = pending.next() {
                        summary.attempted += 1;
                        let request = ProbeRequest { endpoint, timeout: self.timeout };
                        let guard = InFlightGuard::enter(&self.in_flight, &self.peak_in_flight);
                        let reporter = self.reporter.clone();
                        tasks.spawn(async move {
                            let _permit = permit;
                            let _guard = guard;
                            run_probe(request, reporter.as_ref()).await
                        });
                    }
                }
            }
        }

        self.reporter.report(
            TARGET,
            Level::Debug,
            format_args!(
                "Probed {} servers, {} answered{}",
                summary.attempted,
                summary.produced,
                if summary.cancelled { " (cancelled)" } else { "" }
            ),
        );
        summary
    }
}

async fn run_probe(request: ProbeRequest, reporter: &dyn Reporter) -> Option<ServerRecord> {
    match probe_one(&request, reporter).await {
        Ok(record) => Some(record),
        Err(e @ DiscoveryError::Malformed(_)) => {
            reporter.report(TARGET, Level::Warn, format_args!("Dropping {}: {}", request.endpoint, e));
            None
        }
        Err(e) => {
            reporter.report(TARGET, Level::Debug, format_args!("No status from {}: {}", request.endpoint, e));
            None
        }
    }
}

async fn probe_one(request: &ProbeRequest, reporter: &dyn Reporter) -> Result<ServerRecord, DiscoveryError> {
    let target = request.endpoint.socket_addr();
    let socket = bind_ephemeral(&target).await?;
    socket.connect(target).await?;

    socket.send(&build_status_query()).await?;
    let sent_at = Instant::now();

    let mut buffer = vec![0u8; MAX_DATAGRAM];
    let len = timeout_at(sent_at + request.timeout, socket.recv(&mut buffer))
        .await
        .map_err(|_| DiscoveryError::Timeout)??;
    let latency = sent_at.elapsed();

    let reply = parse_status_reply(&buffer[..len])?;
    if reply.truncated {
        reporter.report(
            TARGET,
            Level::Warn,
            format_args!("Status reply from {} exceeded limits and was truncated", request.endpoint),
        );
    }
    Ok(reply.into_record(request.endpoint, latency.as_millis() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::oob::prepend_oob_header;
    use crate::report::MemoryReporter;
    use tokio::net::UdpSocket;

    /// Loopback game server that answers each status query after `delay`.
    /// Tracks how many queries it is sitting on.
    async fn game_server(hostname: &str, delay: Duration, pending: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Endpoint {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let endpoint = Endpoint::from(socket.local_addr().unwrap());
        let hostname = hostname.to_string();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            loop {
                let (len, from) = match socket.recv_from(&mut buf).await {
                    Ok(r) => r,
                    Err(_) => return,
                };
                if &buf[4..len] != b"status" {
                    continue;
                }
                let now = pending.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let socket = socket.clone();
                let pending = pending.clone();
                let body = format!(
                    "print\n\\hostname\\{}\\mapname\\q2dm1\\maxclients\\12\n\
                     3 40 \"one\"\n2 50 \"two\"\n1 60 \"three\"\n",
                    hostname
                );
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    pending.fetch_sub(1, Ordering::SeqCst);
                    let _ = socket.send_to(&prepend_oob_header(body.as_bytes()), from).await;
                });
            }
        });
        endpoint
    }

    async fn simple_server(hostname: &str, delay: Duration) -> Endpoint {
        game_server(hostname, delay, Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0))).await
    }

    fn prober(max: usize, timeout_ms: u64) -> StatusProber {
        StatusProber::with_limits(max, Duration::from_millis(timeout_ms), Arc::new(MemoryReporter::new(64)))
    }

    #[tokio::test]
    async fn produces_parsed_record() {
        let endpoint = simple_server("^1Frag ^7Fest", Duration::ZERO).await;
        let mut records = Vec::new();
        let summary = prober(4, 1000)
            .probe_servers(vec![endpoint], |r| records.push(r), &CancellationToken::new())
            .await;

        assert_eq!(summary, ProbeSummary { attempted: 1, produced: 1, cancelled: false });
        let record = &records[0];
        assert_eq!(record.endpoint, endpoint);
        assert_eq!(record.host_name, "^1Frag ^7Fest");
        assert_eq!(record.map_name, "q2dm1");
        assert_eq!(record.max_players, 12);
        assert_eq!(record.players.len(), 3);
        assert_eq!(record.num_players, 3);
        assert!(record.latency_ms < 1000);
        assert_eq!(record.hostname_segments().len(), 2);
    }

    #[tokio::test]
    async fn never_exceeds_concurrency_bound() {
        let pending = Arc::new(AtomicUsize::new(0));
        let server_peak = Arc::new(AtomicUsize::new(0));
        let mut endpoints = Vec::new();
        for i in 0..20 {
            endpoints.push(game_server(&format!("s{}", i), Duration::from_millis(80), pending.clone(), server_peak.clone()).await);
        }

        let prober = prober(4, 2000);
        let mut produced = 0;
        let summary = prober.probe_servers(endpoints, |_| produced += 1, &CancellationToken::new()).await;

        assert_eq!(summary.attempted, 20);
        assert_eq!(produced, 20);
        assert!(prober.peak_in_flight() <= 4);
        assert!(prober.peak_in_flight() >= 1);
        assert!(server_peak.load(Ordering::SeqCst) <= 4);
        assert_eq!(prober.in_flight(), 0);
    }

    #[tokio::test]
    async fn silent_server_is_dropped_within_timeout() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let live = simple_server("live", Duration::ZERO).await;

        let started = std::time::Instant::now();
        let mut records = Vec::new();
        let summary = prober(8, 200)
            .probe_servers(
                vec![Endpoint::from(silent.local_addr().unwrap()), live],
                |r| records.push(r),
                &CancellationToken::new(),
            )
            .await;

        assert!(started.elapsed() < Duration::from_millis(1500));
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.produced, 1);
        assert_eq!(records[0].endpoint, live);
    }

    #[tokio::test]
    async fn malformed_reply_is_dropped() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::from(socket.local_addr().unwrap());
        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            let (_, from) = socket.recv_from(&mut buf).await.unwrap();
            socket.send_to(&prepend_oob_header(b"info\n\\hostname\\wrong reply\n"), from).await.unwrap();
        });

        let reporter = Arc::new(MemoryReporter::new(16));
        let prober = StatusProber::with_limits(2, Duration::from_millis(500), reporter.clone());
        let summary = prober.probe_servers(vec![endpoint], |_| panic!("no record expected"), &CancellationToken::new()).await;
        assert_eq!(summary.produced, 0);
        assert!(reporter.contains(Level::Warn, "Dropping"));
        assert!(reporter.reported_by("serverscout::prober", Level::Warn));
    }

    #[tokio::test]
    async fn records_arrive_in_completion_order() {
        let slow = simple_server("slow", Duration::from_millis(300)).await;
        let fast = simple_server("fast", Duration::from_millis(10)).await;
        let mut order = Vec::new();
        prober(4, 2000)
            .probe_servers(vec![slow, fast], |r| order.push(r.host_name), &CancellationToken::new())
            .await;
        assert_eq!(order, vec!["fast".to_string(), "slow".to_string()]);
    }

    #[tokio::test]
    async fn cancellation_stops_delivery_promptly() {
        let mut endpoints = Vec::new();
        for i in 0..6 {
            endpoints.push(simple_server(&format!("s{}", i), Duration::from_secs(2)).await);
        }
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let prober = prober(3, 5000);
        let started = std::time::Instant::now();
        let mut delivered = 0;
        let summary = prober.probe_servers(endpoints, |_| delivered += 1, &cancel).await;

        assert!(summary.cancelled);
        assert_eq!(delivered, 0);
        assert!(started.elapsed() < Duration::from_millis(1000));
        assert_eq!(prober.in_flight(), 0);
    }

    #[tokio::test]
    async fn empty_input_completes_immediately() {
        let summary = prober(4, 100).probe_servers(Vec::new(), |_| {}, &CancellationToken::new()).await;
        assert_eq!(summary, ProbeSummary::default());
    }
}
