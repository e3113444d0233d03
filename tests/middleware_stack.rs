// Gating and collaborator middleware exercised through a router
#[cfg(test)]
mod test {
    use std::{
        net::SocketAddr,
        sync::{Arc, Mutex},
        time::{Duration, Instant},
    };

    use axum::{body::Body, extract::ConnectInfo, response::Response};
    use governor::clock::FakeRelativeClock;
    use http::{Method, Request, StatusCode, header};
    use tower::ServiceExt;
    use waymark::{
        CorsConfig, DispatcherConfig, RateGate, RateLimitConfig, Router, build_stack,
        env_var_checker, handler_fn, rate_limiter_with, recoverer, strict_cors, throttle,
    };

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn from_client(uri: &str, addr: &str) -> Request<Body> {
        let mut req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(addr.parse::<SocketAddr>().unwrap()));
        req
    }

    #[tokio::test]
    async fn test_cors_preflight_and_actual_request() {
        let mut router = Router::new();
        router.use_middleware(waymark::cors(&CorsConfig {
            allowed_origins: vec!["https://*.example.com".to_string()],
            allowed_headers: vec!["x-foo".to_string()],
            exposed_headers: vec!["x-total".to_string()],
            ..CorsConfig::default()
        }));
        router
            .get("/data", handler_fn(|_req| async { "data" }))
            .unwrap();
        let dispatcher = router.into_dispatcher();

        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .uri("/data")
            .header(header::ORIGIN, "https://a.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "X-Foo, X-Bar")
            .body(Body::empty())
            .unwrap();
        // Middleware wraps routes, so without an OPTIONS route nothing answers the preflight.
        let response = dispatcher.clone().oneshot(preflight).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let actual = Request::builder()
            .uri("/data")
            .header(header::ORIGIN, "https://a.example.com")
            .body(Body::empty())
            .unwrap();
        let response = dispatcher.clone().oneshot(actual).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://a.example.com"
        );
        assert_eq!(response.headers()[header::VARY], "Origin");
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_EXPOSE_HEADERS],
            "x-total"
        );

        let foreign = Request::builder()
            .uri("/data")
            .header(header::ORIGIN, "https://a.other.com")
            .body(Body::empty())
            .unwrap();
        let response = dispatcher.oneshot(foreign).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            !response
                .headers()
                .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        );
    }

    #[tokio::test]
    async fn test_cors_on_registered_options_route() {
        let mut router = Router::new();
        router.use_middleware(strict_cors(["https://app.example.com"]));
        let options_handler = handler_fn(|_req| async { "never reached" });
        router.options("/data", options_handler).unwrap();
        let dispatcher = router.into_dispatcher();

        let allowed = Request::builder()
            .method(Method::OPTIONS)
            .uri("/data")
            .header(header::ORIGIN, "https://app.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "X-Foo, X-Bar")
            .body(Body::empty())
            .unwrap();
        let response = dispatcher.clone().oneshot(allowed).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "X-Foo, X-Bar"
        );

        let forbidden = Request::builder()
            .method(Method::OPTIONS)
            .uri("/data")
            .header(header::ORIGIN, "https://evil.test")
            .body(Body::empty())
            .unwrap();
        let response = dispatcher.oneshot(forbidden).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(body_string(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_rate_gate_window_per_client() {
        let clock = FakeRelativeClock::default();
        let gate = Arc::new(
            RateGate::with_clock(&RateLimitConfig::default(), clock.clone()).unwrap(),
        );

        let mut router = Router::new();
        router.use_middleware(rate_limiter_with(gate));
        router
            .get("/ping", handler_fn(|_req| async { "pong" }))
            .unwrap();
        let dispatcher = router.into_dispatcher();

        let send = |addr: &'static str| {
            let dispatcher = dispatcher.clone();
            async move {
                dispatcher
                    .oneshot(from_client("/ping", addr))
                    .await
                    .unwrap()
            }
        };

        assert_eq!(send("1.2.3.4:5000").await.status(), StatusCode::OK);
        clock.advance(Duration::from_millis(900));
        let limited = send("1.2.3.4:5000").await;
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_string(limited).await, "Too many requests");

        assert_eq!(send("9.9.9.9:5000").await.status(), StatusCode::OK);

        clock.advance(Duration::from_millis(1100));
        assert_eq!(send("1.2.3.4:5000").await.status(), StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_throttle_serializes_handlers() {
        let spans: Arc<Mutex<Vec<(Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder = spans.clone();

        let mut router = Router::new();
        router.use_middleware(throttle(1).unwrap());
        router
            .get(
                "/slow",
                handler_fn(move |_req| {
                    let recorder = recorder.clone();
                    async move {
                        let start = Instant::now();
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        recorder.lock().unwrap().push((start, Instant::now()));
                        StatusCode::OK
                    }
                }),
            )
            .unwrap();
        let dispatcher = router.into_dispatcher();

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher
                        .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
                        .await
                        .unwrap()
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().status(), StatusCode::OK);
        }

        let mut spans = spans.lock().unwrap().clone();
        assert_eq!(spans.len(), 2);
        spans.sort_by_key(|(start, _)| *start);
        assert!(spans[0].1 <= spans[1].0, "handler bodies overlapped");
    }

    #[tokio::test]
    async fn test_recoverer_outermost_catches_handler_panic() {
        let mut router = Router::new();
        router.use_middleware(recoverer());
        router
            .get(
                "/boom",
                handler_fn(|_req| async {
                    if true {
                        panic!("handler exploded");
                    }
                    StatusCode::OK
                }),
            )
            .unwrap();

        let response = router
            .into_dispatcher()
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_env_checker_short_circuits_routes() {
        let mut router = Router::new();
        router.use_middleware(env_var_checker(["WAYMARK_IT_SURELY_UNSET"]));
        router
            .get("/needs-env", handler_fn(|_req| async { "served" }))
            .unwrap();

        let response = router
            .into_dispatcher()
            .oneshot(
                Request::builder()
                    .uri("/needs-env")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_string(response).await,
            "Missing required environment variables: [WAYMARK_IT_SURELY_UNSET]"
        );
    }

    #[tokio::test]
    async fn test_configured_stack_serves_requests() {
        let config = DispatcherConfig::builder()
            .cors(CorsConfig::permissive())
            .throttle(2)
            .rate_limit(RateLimitConfig::default())
            .build()
            .unwrap();

        let mut router = Router::new();
        for middleware in build_stack(&config).unwrap() {
            router.use_middleware(middleware);
        }
        router
            .get("/ok", handler_fn(|_req| async { "ok" }))
            .unwrap();

        let req = {
            let mut req = from_client("/ok", "127.0.0.1:40000");
            req.headers_mut()
                .insert(header::ORIGIN, "https://x.test".parse().unwrap());
            req
        };
        let response = router.into_dispatcher().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(body_string(response).await, "ok");
    }
}
