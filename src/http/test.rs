#[cfg(test)]
mod tests {
    use crate::config::{HttpConfig, RateLimitConfig};
    use crate::http::RateLimitedHttpClient;
    use std::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_config() -> HttpConfig {
        HttpConfig {
            connect_timeout_seconds: 10,
            read_timeout_seconds: 30,
        }
    }

    #[tokio::test]
    async fn test_zero_quota_falls_back_to_minimum() {
        let client = RateLimitedHttpClient::new(
            &http_config(),
            &RateLimitConfig {
                requests_per_second: 0,
                burst_capacity: 0,
            },
        )
        .unwrap();

        // One permit available, then exhausted
        assert!(client.try_acquire());
        assert!(!client.try_acquire());
    }

    #[tokio::test]
    async fn test_rate_limiting_timing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200))
            .expect(3)
            .mount(&server)
            .await;

        let client = RateLimitedHttpClient::new(
            &http_config(),
            &RateLimitConfig {
                requests_per_second: 2,
                burst_capacity: 1,
            },
        )
        .unwrap();

        let start = Instant::now();
        for _ in 0..3 {
            let request = client.client().get(format!("{}/ping", server.uri()));
            let response = client.execute_with_rate_limit(request).await.unwrap();
            assert_eq!(response.status(), 200);
        }

        // Burst of one at 2/s: the third request waits roughly a second
        let elapsed = start.elapsed();
        assert!(elapsed.as_millis() >= 900, "took {elapsed:?}");
    }
}
