use super::ip::extract_ip_from_headers;
use axum::{
    extract::{connect_info::ConnectInfo, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::{
    collections::{HashMap, VecDeque},
    net::{IpAddr, SocketAddr},
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

type Rejection = (StatusCode, Json<serde_json::Value>);

fn too_many_requests(retry_after_secs: u64) -> Rejection {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": {
                "code": "RATE_LIMITED",
                "message": format!("Too many requests. Please retry after {} seconds", retry_after_secs),
            },
            "retry_after_seconds": retry_after_secs,
            "status": 429,
        })),
    )
}

/// Sliding-window limiter keyed by client IP. Timestamps per IP are kept
/// oldest first.
#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<RwLock<HashMap<IpAddr, VecDeque<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_seconds: u64) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window: Duration::from_secs(window_seconds),
        }
    }

    fn expire(&self, now: Instant, timestamps: &mut VecDeque<Instant>) {
        // Zeitsprung rückwärts: Eintrag bleibt (checked_duration_since == None)
        while let Some(&oldest) = timestamps.front() {
            match now.checked_duration_since(oldest) {
                Some(age) if age >= self.window => {
                    timestamps.pop_front();
                }
                _ => break,
            }
        }
    }

    /// Records the request if allowed, otherwise returns the 429 response.
    pub async fn check_rate_limit(&self, ip: IpAddr) -> Result<(), Rejection> {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        let timestamps = requests.entry(ip).or_default();
        self.expire(now, timestamps);

        if timestamps.len() >= self.max_requests {
            let retry_after = timestamps
                .front()
                .and_then(|&oldest| now.checked_duration_since(oldest))
                .map(|age| self.window.saturating_sub(age))
                .unwrap_or(Duration::from_secs(1));
            return Err(too_many_requests(retry_after.as_secs().max(1)));
        }

        timestamps.push_back(now);
        Ok(())
    }

    /// Drops IPs without requests inside the window.
    pub async fn cleanup_old_entries(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        requests.retain(|_, timestamps| {
            self.expire(now, timestamps);
            !timestamps.is_empty()
        });
    }

    #[cfg(test)]
    async fn tracked_ips(&self) -> usize {
        self.requests.read().await.len()
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok()).unwrap_or(default)
}

/// Global per-IP limit for every route.
///
/// Defaults to 1000 requests per 60 s; override with
/// `VIRENWALD_RATE_LIMIT_MAX_REQUESTS` and `VIRENWALD_RATE_LIMIT_WINDOW_SECONDS`.
pub async fn rate_limit_middleware(req: Request, next: Next) -> Response {
    let remote_ip = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
    let ip = extract_ip_from_headers(req.headers(), remote_ip);

    lazy_static::lazy_static! {
        static ref GLOBAL_RATE_LIMITER: RateLimiter = RateLimiter::new(
            env_or("VIRENWALD_RATE_LIMIT_MAX_REQUESTS", 1000usize),
            env_or("VIRENWALD_RATE_LIMIT_WINDOW_SECONDS", 60u64),
        );
        static ref GLOBAL_CLEANUP_STARTED: OnceLock<()> = OnceLock::new();
    }

    // Cleanup loop for the global map, spawned once
    GLOBAL_CLEANUP_STARTED.get_or_init(|| {
        let limiter = GLOBAL_RATE_LIMITER.clone();
        let cleanup_secs = env_or("VIRENWALD_GLOBAL_RATE_LIMIT_CLEANUP_INTERVAL", 600u64).clamp(60, 3600);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(cleanup_secs));
            loop {
                interval.tick().await;
                limiter.cleanup_old_entries().await;
            }
        });
    });

    match GLOBAL_RATE_LIMITER.check_rate_limit(ip).await {
        Ok(()) => next.run(req).await,
        Err((status, body)) => (status, body).into_response(),
    }
}

/// Named limiters for individual endpoints (e.g. starting scans).
#[derive(Clone, Default)]
pub struct EndpointRateLimiter {
    limiters: Arc<HashMap<String, RateLimiter>>,
}

impl EndpointRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces limits as `(endpoint, max_requests, window_seconds)`.
    pub fn with_limits(self, limits: Vec<(&str, usize, u64)>) -> Self {
        let mut map = Arc::try_unwrap(self.limiters).unwrap_or_else(|arc| (*arc).clone());
        for (endpoint, max_requests, window_seconds) in limits {
            map.insert(endpoint.to_string(), RateLimiter::new(max_requests, window_seconds));
        }
        Self { limiters: Arc::new(map) }
    }

    pub async fn check_endpoint_limit(&self, endpoint: &str, ip: IpAddr) -> Result<(), Rejection> {
        match self.limiters.get(endpoint) {
            Some(limiter) => limiter.check_rate_limit(ip).await,
            None => Ok(()),
        }
    }

    pub async fn cleanup_all(&self) {
        for limiter in self.limiters.values() {
            limiter.cleanup_old_entries().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limits_within_window_then_recovers() {
        let limiter = RateLimiter::new(3, 1);
        let ip = IpAddr::from([127, 0, 0, 1]);

        assert!(limiter.check_rate_limit(ip).await.is_ok());
        assert!(limiter.check_rate_limit(ip).await.is_ok());
        assert!(limiter.check_rate_limit(ip).await.is_ok());
        let (status, body) = limiter.check_rate_limit(ip).await.unwrap_err();
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body.0["error"]["code"], "RATE_LIMITED");

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.check_rate_limit(ip).await.is_ok());
    }

    #[tokio::test]
    async fn ips_are_limited_independently() {
        let limiter = RateLimiter::new(1, 60);
        let ip1 = IpAddr::from([127, 0, 0, 1]);
        let ip2 = IpAddr::from([127, 0, 0, 2]);

        assert!(limiter.check_rate_limit(ip1).await.is_ok());
        assert!(limiter.check_rate_limit(ip2).await.is_ok());
        assert!(limiter.check_rate_limit(ip1).await.is_err());
        assert!(limiter.check_rate_limit(ip2).await.is_err());
    }

    #[tokio::test]
    async fn cleanup_forgets_idle_ips() {
        let limiter = RateLimiter::new(5, 1);
        limiter.check_rate_limit(IpAddr::from([10, 0, 0, 1])).await.unwrap();
        assert_eq!(limiter.tracked_ips().await, 1);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        limiter.cleanup_old_entries().await;
        assert_eq!(limiter.tracked_ips().await, 0);
    }

    #[tokio::test]
    async fn endpoint_limits_only_apply_to_named_endpoints() {
        let limiter = EndpointRateLimiter::new().with_limits(vec![("/scans", 1, 60)]);
        let ip = IpAddr::from([127, 0, 0, 1]);
        assert!(limiter.check_endpoint_limit("/scans", ip).await.is_ok());
        assert!(limiter.check_endpoint_limit("/scans", ip).await.is_err());
        assert!(limiter.check_endpoint_limit("/browse", ip).await.is_ok());
    }
}
