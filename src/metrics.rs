//! Prometheus metrics definitions for herakles-sockstat-exporter.
//!
//! Only per-user metrics are exposed. Every series carries the `user` and
//! `uid` labels.

use herakles_sockstat_exporter::{Emission, Reporter, UserMetric};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts, Registry};
use std::sync::{Arc, PoisonError, RwLock};

/// Collection of per-user Prometheus metrics.
#[derive(Clone)]
pub struct SockstatMetrics {
    pub user_open_files: GaugeVec,       // labels: user, uid
    pub user_sockets: GaugeVec,          // labels: user, uid, kind
    pub user_tcp_connections: GaugeVec,  // labels: user, uid, state
    /// Held for writing across reset and rewrite, for reading across gather.
    report_lock: Arc<RwLock<()>>,
}

impl SockstatMetrics {
    /// Creates and registers all Prometheus metrics with the registry.
    pub fn new(registry: &Registry) -> Result<Self, Box<dyn std::error::Error>> {
        let user_open_files = GaugeVec::new(
            Opts::new(
                "herakles_sockstat_user_open_files",
                "Open file descriptors of all processes of a user",
            ),
            &["user", "uid"],
        )?;
        let user_sockets = GaugeVec::new(
            Opts::new(
                "herakles_sockstat_user_sockets",
                "Sockets held by a user, by whether the kernel tables account for them (known/unknown)",
            ),
            &["user", "uid", "kind"],
        )?;
        let user_tcp_connections = GaugeVec::new(
            Opts::new(
                "herakles_sockstat_user_tcp_connections",
                "TCP and TCP6 connection table lines owned by a user, by state",
            ),
            &["user", "uid", "state"],
        )?;

        registry.register(Box::new(user_open_files.clone()))?;
        registry.register(Box::new(user_sockets.clone()))?;
        registry.register(Box::new(user_tcp_connections.clone()))?;

        Ok(Self {
            user_open_files,
            user_sockets,
            user_tcp_connections,
            report_lock: Arc::new(RwLock::new(())),
        })
    }

    /// Drops all per-user series. Users that disappeared between runs must
    /// not keep reporting their last values.
    pub fn reset(&self) {
        self.user_open_files.reset();
        self.user_sockets.reset();
        self.user_tcp_connections.reset();
    }

    /// Replaces the exported series with one complete report. A concurrent
    /// [`gather`](Self::gather) sees either the old or the new report.
    pub fn publish(&self, emissions: &[Emission]) {
        let _guard = self
            .report_lock
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        self.reset();
        let mut reporter = PrometheusReporter::new(self);
        for e in emissions {
            reporter.emit(e.uid, &e.user, e.metric, e.value);
        }
    }

    /// Gathers `registry` without interleaving with a publish.
    pub fn gather(&self, registry: &Registry) -> Vec<MetricFamily> {
        let _guard = self
            .report_lock
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        registry.gather()
    }
}

/// [`Reporter`] writing straight into the gauge vectors.
pub struct PrometheusReporter<'a> {
    metrics: &'a SockstatMetrics,
}

impl<'a> PrometheusReporter<'a> {
    pub fn new(metrics: &'a SockstatMetrics) -> Self {
        Self { metrics }
    }
}

impl Reporter for PrometheusReporter<'_> {
    fn emit(&mut self, uid: u32, user: &str, metric: UserMetric, value: u64) {
        let uid = uid.to_string();
        let value = value as f64;
        match metric {
            UserMetric::OpenFiles => self
                .metrics
                .user_open_files
                .with_label_values(&[user, uid.as_str()])
                .set(value),
            UserMetric::KnownSockets => self
                .metrics
                .user_sockets
                .with_label_values(&[user, uid.as_str(), "known"])
                .set(value),
            UserMetric::UnknownSockets => self
                .metrics
                .user_sockets
                .with_label_values(&[user, uid.as_str(), "unknown"])
                .set(value),
            UserMetric::TcpState(state) => self
                .metrics
                .user_tcp_connections
                .with_label_values(&[user, uid.as_str(), state.as_str()])
                .set(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herakles_sockstat_exporter::TcpState;
    use prometheus::{Encoder, TextEncoder};

    fn render(registry: &Registry) -> String {
        encode(&registry.gather())
    }

    fn encode(families: &[MetricFamily]) -> String {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    fn emission(uid: u32, user: &str, metric: UserMetric, value: u64) -> Emission {
        Emission {
            uid,
            user: user.to_string(),
            metric,
            value,
        }
    }

    #[test]
    fn test_publish_sets_labels() {
        let registry = Registry::new();
        let metrics = SockstatMetrics::new(&registry).unwrap();

        metrics.publish(&[
            emission(5000, "carol", UserMetric::OpenFiles, 12),
            emission(5000, "carol", UserMetric::UnknownSockets, 3),
            emission(5000, "carol", UserMetric::TcpState(TcpState::Listen), 2),
        ]);

        let text = render(&registry);
        assert!(text.contains(r#"herakles_sockstat_user_open_files{uid="5000",user="carol"} 12"#));
        assert!(text.contains(
            r#"herakles_sockstat_user_sockets{kind="unknown",uid="5000",user="carol"} 3"#
        ));
        assert!(text.contains(
            r#"herakles_sockstat_user_tcp_connections{state="listen",uid="5000",user="carol"} 2"#
        ));
    }

    #[test]
    fn test_publish_drops_stale_users() {
        let registry = Registry::new();
        let metrics = SockstatMetrics::new(&registry).unwrap();

        metrics.publish(&[emission(5000, "carol", UserMetric::OpenFiles, 1)]);
        metrics.publish(&[emission(5001, "dave", UserMetric::OpenFiles, 1)]);

        let text = render(&registry);
        assert!(!text.contains("carol"));
        assert!(text.contains("dave"));
    }

    #[test]
    fn test_gather_never_sees_partial_report() {
        const USERS: u32 = 400;

        let registry = Registry::new();
        let metrics = SockstatMetrics::new(&registry).unwrap();
        let report: Vec<Emission> = (0..USERS)
            .map(|i| emission(1000 + i, &format!("user{i}"), UserMetric::OpenFiles, 1))
            .collect();
        metrics.publish(&report);

        let incomplete = std::thread::scope(|scope| {
            for _ in 0..2 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        metrics.publish(&report);
                    }
                });
            }
            let readers: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        (0..100)
                            .filter(|_| {
                                let text = encode(&metrics.gather(&registry));
                                let series = text
                                    .lines()
                                    .filter(|l| l.starts_with("herakles_sockstat_user_open_files{"))
                                    .count();
                                series != USERS as usize
                            })
                            .count()
                    })
                })
                .collect();
            readers
                .into_iter()
                .map(|r| r.join().unwrap())
                .sum::<usize>()
        });

        assert_eq!(incomplete, 0);
    }
}
