//! Cross-module tests driven by local TCP fixtures, so the suite needs no
//! external network and no browser.

#[cfg(test)]
mod fixtures {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Minimal HTTP server: every connection gets the same canned response.
    /// An HTTPS attempt against it fails the TLS handshake, which is exactly
    /// the transport failure the fallback path needs.
    pub async fn spawn_server(response: String) -> (u16, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let response = response.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (port, handle)
    }

    pub fn ok_response(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    pub fn redirect_response(location: &str) -> String {
        format!(
            "HTTP/1.1 301 Moved Permanently\r\nLocation: {location}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        )
    }

    /// A port with nothing listening on it.
    pub async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }
}

#[cfg(test)]
mod probe_tests {
    use super::fixtures::*;
    use crate::probe::{Classification, Prober};
    use crate::Config;
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn https_refused_falls_back_to_http() {
        let (port, server) = spawn_server(ok_response("hello")).await;
        let prober = Prober::new(&test_config()).unwrap();

        let result = prober.probe(&format!("127.0.0.1:{port}")).await;

        assert!(result.target.starts_with("http://"), "target: {}", result.target);
        assert_eq!(result.http_status, 200);
        assert_eq!(result.classification, Classification::Alive);
        assert!(result.is_alive);
        assert_eq!(result.message, "OK");

        server.abort();
    }

    #[tokio::test]
    async fn dead_host_is_unreachable_with_http_target() {
        let port = closed_port().await;
        let prober = Prober::new(&test_config()).unwrap();

        let result = prober.probe(&format!("127.0.0.1:{port}")).await;

        assert!(result.target.starts_with("http://"));
        assert_eq!(result.http_status, 0);
        assert_eq!(result.classification, Classification::Unreachable);
        assert!(!result.is_alive);
        assert!(!result.message.is_empty());
    }

    #[tokio::test]
    async fn redirect_recorded_when_not_followed() {
        let (port, server) = spawn_server(redirect_response("http://example.com/")).await;
        let prober = Prober::new(&test_config()).unwrap();

        let result = prober.probe(&format!("http://127.0.0.1:{port}")).await;

        assert_eq!(result.http_status, 301);
        assert_eq!(result.classification, Classification::Redirect);
        assert!(result.is_alive);

        server.abort();
    }

    #[tokio::test]
    async fn redirect_followed_to_final_response() {
        let (dest_port, dest) = spawn_server(ok_response("landed")).await;
        let (port, server) =
            spawn_server(redirect_response(&format!("http://127.0.0.1:{dest_port}/"))).await;

        let config = Config {
            follow_redirects: true,
            ..test_config()
        };
        let prober = Prober::new(&config).unwrap();

        let result = prober.probe(&format!("http://127.0.0.1:{port}")).await;

        assert_eq!(result.http_status, 200);
        assert_eq!(result.classification, Classification::Alive);

        server.abort();
        dest.abort();
    }

    #[tokio::test]
    async fn scheme_qualified_https_gets_no_fallback() {
        // plain-HTTP listener, so the TLS handshake fails; an explicit
        // https:// target must not be retried over http
        let (port, server) = spawn_server(ok_response("hello")).await;
        let prober = Prober::new(&test_config()).unwrap();

        let result = prober.probe(&format!("https://127.0.0.1:{port}")).await;

        assert!(result.target.starts_with("https://"));
        assert_eq!(result.http_status, 0);
        assert_eq!(result.classification, Classification::Unreachable);
        assert!(!result.is_alive);

        server.abort();
    }

    #[tokio::test]
    async fn extraction_attaches_title_and_category() {
        let body = "<html><head><title>Portal</title></head><body><form>username password</form></body></html>";
        let (port, server) = spawn_server(ok_response(body)).await;

        let config = Config {
            extract_info: true,
            ..test_config()
        };
        let prober = Prober::new(&config).unwrap();

        let result = prober.probe(&format!("http://127.0.0.1:{port}")).await;

        assert_eq!(result.page_title, "Portal");
        assert_eq!(
            result.page_category,
            Some(crate::analyzer::PageCategory::Login)
        );

        server.abort();
    }
}

#[cfg(test)]
mod pipeline_tests {
    use super::fixtures::*;
    use crate::pipeline::{dedup_targets, Dispatcher};
    use crate::probe::Prober;
    use crate::Config;
    use std::time::Duration;

    #[tokio::test]
    async fn duplicate_targets_yield_one_result() {
        let (port, server) = spawn_server(ok_response("hello")).await;

        let raw = vec![
            format!("127.0.0.1:{port}"),
            format!("127.0.0.1:{port}"),
            format!("http://127.0.0.1:{port}/"),
        ];
        let targets = dedup_targets(&raw);
        assert_eq!(targets.len(), 1);

        let config = Config {
            timeout: Duration::from_secs(5),
            concurrency: 4,
            ..Default::default()
        };
        let prober = Prober::new(&config).unwrap();
        let dispatcher = Dispatcher::new(config, prober, None);

        let report = dispatcher.run(targets).await;

        assert_eq!(report.total, 1);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.alive, 1);
        assert_eq!(report.dead, 0);
        assert_eq!(report.screenshot_count, 0);
        assert!(report.results[0].screenshot.is_none());

        server.abort();
    }

    #[tokio::test]
    async fn every_input_yields_exactly_one_record() {
        let (port, server) = spawn_server(ok_response("hello")).await;
        let dead = closed_port().await;

        let targets = dedup_targets(&[
            format!("127.0.0.1:{port}"),
            format!("127.0.0.1:{dead}"),
        ]);

        let config = Config {
            timeout: Duration::from_secs(5),
            concurrency: 2,
            ..Default::default()
        };
        let prober = Prober::new(&config).unwrap();
        let dispatcher = Dispatcher::new(config, prober, None);

        let report = dispatcher.run(targets).await;

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.alive, 1);
        assert_eq!(report.dead, 1);

        server.abort();
    }
}

#[cfg(test)]
mod engine_tests {
    use crate::capture::ScreenshotEngine;
    use crate::Config;
    use std::path::PathBuf;

    #[tokio::test]
    async fn stop_twice_is_safe_and_submit_after_stop_resolves_empty() {
        let engine = ScreenshotEngine::new(Config::default(), 1);

        engine.stop().await;
        engine.stop().await;

        let reply = engine.submit("example.com", PathBuf::from("/tmp/never.jpg")).await;
        assert_eq!(reply.await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_queue_abandons_submission_within_bounded_wait() {
        // 1 worker x multiplier 2 = queue capacity 2; the engine is never
        // started, so nothing drains the queue
        let config = Config {
            queue_multiplier: 2,
            ..Default::default()
        };
        let engine = ScreenshotEngine::new(config, 1);

        let mut first = engine.submit("a.com", PathBuf::from("/tmp/a.jpg")).await;
        let mut second = engine.submit("b.com", PathBuf::from("/tmp/b.jpg")).await;

        // queue is full now; the third submission must resolve empty instead
        // of blocking the caller indefinitely
        let third = engine.submit("c.com", PathBuf::from("/tmp/c.jpg")).await;
        assert_eq!(third.await.unwrap(), None);

        // the queued tasks are still pending, not spuriously resolved
        assert!(first.try_recv().is_err());
        assert!(second.try_recv().is_err());
    }
}
