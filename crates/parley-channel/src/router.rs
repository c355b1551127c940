//! Command router
//!
//! Verbs resolve by exact match first (case-insensitive), then by the first
//! registered namespace prefix that matches. Each resolved call runs as its
//! own task, so a slow handler never blocks the connection reader.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use parley_protocol::{CommandEnvelope, Frame};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::{
    Invoke, NamespaceEntry, NamespaceHandler, ObserveEntry, ObserveHandler, RequestEntry,
    RequestHandler,
};
use crate::connection::{CallContext, Connection, FrameSink};
use crate::error::{ChannelError, HandlerFault};
use crate::gate::{GateKey, SerialGateTable, Ticket};
use crate::Result;

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Exact,
    Namespace,
}

#[derive(Clone)]
struct Route {
    key: String,
    gate: Option<GateKey>,
    entry: Arc<dyn Invoke>,
}

#[derive(Default)]
pub struct RouterBuilder {
    exact: HashMap<String, Route>,
    namespaces: Vec<Route>,
    problems: Vec<String>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request/result handler under an exact verb
    pub fn request<H: RequestHandler>(mut self, verb: &str, handler: H) -> Self {
        let gate = H::SERIAL.then(GateKey::of::<H>);
        self.add_exact(verb, gate, Arc::new(RequestEntry(handler)));
        self
    }

    /// Register a fire-and-observe handler under an exact verb
    pub fn observe<H: ObserveHandler>(mut self, verb: &str, handler: H) -> Self {
        let gate = H::SERIAL.then(GateKey::of::<H>);
        self.add_exact(verb, gate, Arc::new(ObserveEntry(handler)));
        self
    }

    /// Register a handler for every verb starting with `prefix`, which must
    /// end with `.`
    pub fn namespace<H: NamespaceHandler>(mut self, prefix: &str, handler: H) -> Self {
        if !prefix.ends_with('.') || prefix.len() < 2 || prefix.contains(char::is_whitespace) {
            self.problems
                .push(format!("namespace prefix must end with '.': {prefix:?}"));
            return self;
        }
        if self
            .namespaces
            .iter()
            .any(|route| route.key.eq_ignore_ascii_case(prefix))
        {
            self.problems.push(format!("duplicate namespace {prefix}"));
            return self;
        }

        let gate = H::SERIAL.then(GateKey::of::<H>);
        self.namespaces.push(Route {
            key: prefix.to_string(),
            gate,
            entry: Arc::new(NamespaceEntry::new(handler, prefix)),
        });
        self
    }

    fn add_exact(&mut self, verb: &str, gate: Option<GateKey>, entry: Arc<dyn Invoke>) {
        if verb.is_empty() || verb.contains(char::is_whitespace) {
            self.problems.push(format!("invalid verb {verb:?}"));
            return;
        }
        let key = verb.to_ascii_lowercase();
        if self.exact.contains_key(&key) {
            self.problems.push(format!("duplicate verb {verb}"));
            return;
        }
        self.exact.insert(
            key,
            Route {
                key: verb.to_string(),
                gate,
                entry,
            },
        );
    }

    pub fn build(self) -> Result<Router> {
        if !self.problems.is_empty() {
            return Err(ChannelError::Registration(self.problems.join("; ")));
        }

        tracing::debug!(
            exact = self.exact.len(),
            namespaces = self.namespaces.len(),
            "Router built"
        );

        Ok(Router {
            exact: self.exact,
            namespaces: self.namespaces,
            gates: Arc::new(SerialGateTable::new()),
        })
    }
}

/// Immutable routing table shared by every connection.
///
/// Owns the process-wide [`SerialGateTable`], so a serial handler type never
/// overlaps with itself even across connections.
pub struct Router {
    exact: HashMap<String, Route>,
    namespaces: Vec<Route>,
    gates: Arc<SerialGateTable>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn gates(&self) -> &Arc<SerialGateTable> {
        &self.gates
    }

    /// Create the context for a new client connection
    pub fn connect(&self, sink: FrameSink, cancel: CancellationToken) -> Arc<Connection> {
        Connection::new(sink, Arc::clone(&self.gates), cancel)
    }

    /// Which registration `verb` resolves to, as `(kind, registered key)`
    pub fn resolve(&self, verb: &str) -> Option<(RouteKind, &str)> {
        self.lookup(verb).map(|(kind, route)| (kind, route.key.as_str()))
    }

    fn lookup(&self, verb: &str) -> Option<(RouteKind, &Route)> {
        if let Some(route) = self.exact.get(&verb.to_ascii_lowercase()) {
            return Some((RouteKind::Exact, route));
        }
        self.namespaces
            .iter()
            .find(|route| {
                verb.get(..route.key.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(&route.key))
            })
            .map(|route| (RouteKind::Namespace, route))
    }

    /// Route one inbound envelope.
    ///
    /// A stream awaiting a reply takes the envelope first. Otherwise the
    /// handler is spawned and its task returned; unknown verbs are answered
    /// with `commandError` and yield `None`. Serial calls join their gate's
    /// queue before this returns, so calls routed in order run in order.
    pub fn route(
        &self,
        connection: &Arc<Connection>,
        envelope: CommandEnvelope,
    ) -> Option<JoinHandle<()>> {
        let envelope = connection.streams().intercept(envelope)?;

        let Some((kind, route)) = self.lookup(envelope.verb()) else {
            tracing::warn!(target: DISPATCH_TARGET, verb = envelope.verb(), "Unknown command");
            let error = ChannelError::Routing {
                verb: envelope.verb().to_string(),
            };
            // The reader never waits on the outbound queue
            if let Err(e) = connection
                .sink()
                .try_send(Frame::command_error(envelope.verb(), error.kind(), &error))
            {
                tracing::debug!(target: DISPATCH_TARGET, error = %e, "Routing error dropped");
            }
            return None;
        };

        tracing::debug!(
            target: DISPATCH_TARGET,
            connection = %connection.id(),
            verb = envelope.verb(),
            route = ?kind,
            handler = route.entry.handler_name(),
            "Dispatching command"
        );

        // Queue position is fixed here, before the task exists
        let ticket = route.gate.map(|key| connection.gates().enqueue(key));
        let route = route.clone();
        let ctx = CallContext::new(Arc::clone(connection), envelope.verb());
        let payload = envelope.into_payload();
        Some(tokio::spawn(dispatch(route, ctx, payload, ticket)))
    }
}

async fn dispatch(route: Route, ctx: CallContext, payload: Option<Value>, ticket: Option<Ticket>) {
    let gates = Arc::clone(ctx.connection().gates());

    let lease = match ticket {
        Some(ticket) => match ticket.wait(ctx.cancellation()).await {
            Ok(lease) => Some(lease),
            Err(_) => {
                tracing::debug!(target: DISPATCH_TARGET, verb = ctx.verb(), "Connection closed while waiting for serial gate");
                return;
            }
        },
        None => None,
    };

    let result = AssertUnwindSafe(route.entry.invoke(&ctx, payload))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            tracing::error!(target: DISPATCH_TARGET, verb = ctx.verb(), "Handler panicked");
            Err(ChannelError::Handler(HandlerFault::new("Handler panicked")))
        });

    let frame = match result {
        Ok(frame) => frame,
        Err(error) => {
            tracing::warn!(target: DISPATCH_TARGET, verb = ctx.verb(), kind = %error.kind(), error = %error, "Command failed");
            Some(route.entry.error_frame(ctx.verb(), &error))
        }
    };

    if let Some(frame) = frame {
        if ctx.send(frame).await.is_err() {
            tracing::debug!(target: DISPATCH_TARGET, verb = ctx.verb(), "Reply dropped, connection closed");
        }
    }

    // Released only after the reply is queued, so serial replies keep their order
    if let Some(lease) = lease {
        gates.release(lease);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Empty;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc::Receiver;
    use tokio::sync::Barrier;

    #[derive(Deserialize)]
    struct EchoArgs {
        text: String,
    }

    #[derive(Serialize)]
    struct EchoReply {
        text: String,
    }

    struct Echo;

    #[async_trait]
    impl RequestHandler for Echo {
        type Arg = EchoArgs;
        type Output = EchoReply;
        const RESULT_VERB: &'static str = "echoed";

        async fn handle(&self, _ctx: &CallContext, arg: EchoArgs) -> std::result::Result<EchoReply, HandlerFault> {
            Ok(EchoReply { text: arg.text })
        }
    }

    struct BrokenLocales;

    #[async_trait]
    impl RequestHandler for BrokenLocales {
        type Arg = Empty;
        type Output = Vec<String>;
        const RESULT_VERB: &'static str = "gotLocales";

        async fn handle(&self, _ctx: &CallContext, _arg: Empty) -> std::result::Result<Vec<String>, HandlerFault> {
            Err(HandlerFault::new("disk on fire"))
        }
    }

    struct Panicky;

    #[async_trait]
    impl ObserveHandler for Panicky {
        type Arg = Empty;

        async fn handle(&self, _ctx: &CallContext, _arg: Empty) -> std::result::Result<(), HandlerFault> {
            panic!("boom");
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl NamespaceHandler for Recorder {
        async fn handle(
            &self,
            ctx: &CallContext,
            verb: &str,
            _payload: Option<Value>,
        ) -> std::result::Result<(), HandlerFault> {
            self.seen.lock().push(verb.to_string());
            ctx.send_payload("recorded", &verb).await?;
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct Overlap {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Overlap {
        async fn track(&self) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct SerialSave(Overlap);

    #[async_trait]
    impl RequestHandler for SerialSave {
        type Arg = Empty;
        type Output = Empty;
        const RESULT_VERB: &'static str = "saved";
        const SERIAL: bool = true;

        async fn handle(&self, _ctx: &CallContext, _arg: Empty) -> std::result::Result<Empty, HandlerFault> {
            self.0.track().await;
            Ok(Empty {})
        }
    }

    struct Rendezvous(Arc<Barrier>);

    #[async_trait]
    impl RequestHandler for Rendezvous {
        type Arg = Empty;
        type Output = Empty;
        const RESULT_VERB: &'static str = "met";

        async fn handle(&self, _ctx: &CallContext, _arg: Empty) -> std::result::Result<Empty, HandlerFault> {
            self.0.wait().await;
            Ok(Empty {})
        }
    }

    fn connect(router: &Router) -> (Arc<Connection>, Receiver<Frame>) {
        let (sink, rx) = FrameSink::channel();
        (router.connect(sink, CancellationToken::new()), rx)
    }

    async fn call(router: &Router, connection: &Arc<Connection>, raw: &str) {
        if let Some(task) = router.route(connection, CommandEnvelope::decode(raw).unwrap()) {
            task.await.unwrap();
        }
    }

    async fn next_frame(rx: &mut Receiver<Frame>) -> String {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap()
            .into_string()
    }

    #[tokio::test]
    async fn test_exact_match_ignores_case() {
        let router = Router::builder().request("Echo", Echo).build().unwrap();
        let (connection, mut rx) = connect(&router);

        call(&router, &connection, r#"ECHO {"text":"hi"}"#).await;
        assert_eq!(next_frame(&mut rx).await, r#"echoed {"text":"hi"}"#);
        assert_eq!(router.resolve("echo"), Some((RouteKind::Exact, "Echo")));
    }

    #[tokio::test]
    async fn test_namespace_prefix_routing() {
        let recorder = Recorder::default();
        let router = Router::builder()
            .namespace("Foo.", recorder.clone())
            .request("Foo.Special", Echo)
            .build()
            .unwrap();
        let (connection, mut rx) = connect(&router);

        call(&router, &connection, "Foo.Bar").await;
        assert_eq!(next_frame(&mut rx).await, r#"recorded "Bar""#);

        // Exact registrations win over the prefix
        call(&router, &connection, r#"foo.special {"text":"x"}"#).await;
        assert_eq!(next_frame(&mut rx).await, r#"echoed {"text":"x"}"#);

        // The dot is part of the prefix
        call(&router, &connection, "Foobar {}").await;
        let frame = next_frame(&mut rx).await;
        assert!(frame.starts_with("commandError "));
        assert!(frame.contains(r#""kind":"routing""#));

        assert_eq!(*recorder.seen.lock(), vec!["Bar".to_string()]);
        assert_eq!(router.resolve("FOO.anything"), Some((RouteKind::Namespace, "Foo.")));
    }

    #[tokio::test]
    async fn test_first_registered_prefix_wins() {
        let first = Recorder::default();
        let second = Recorder::default();
        let router = Router::builder()
            .namespace("A.", first.clone())
            .namespace("A.B.", second.clone())
            .build()
            .unwrap();
        let (connection, _rx) = connect(&router);

        call(&router, &connection, "A.B.C").await;
        assert_eq!(*first.seen.lock(), vec!["B.C".to_string()]);
        assert!(second.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_verb_reports_routing_error() {
        let router = Router::builder().request("Echo", Echo).build().unwrap();
        let (connection, mut rx) = connect(&router);

        assert!(router
            .route(&connection, CommandEnvelope::decode("Nope {}").unwrap())
            .is_none());
        let frame = CommandEnvelope::decode(&next_frame(&mut rx).await).unwrap();
        assert_eq!(frame.verb(), "commandError");
        assert_eq!(
            frame.payload(),
            Some(&serde_json::json!({
                "verb": "Nope",
                "kind": "routing",
                "error": "Unknown command: Nope"
            }))
        );
    }

    #[tokio::test]
    async fn test_handler_failure_uses_paired_error_verb() {
        let router = Router::builder()
            .request("GetLocaleList", BrokenLocales)
            .build()
            .unwrap();
        let (connection, mut rx) = connect(&router);

        call(&router, &connection, "GetLocaleList {}").await;
        assert_eq!(
            next_frame(&mut rx).await,
            r#"gotLocalesError {"error":"disk on fire"}"#
        );
    }

    #[tokio::test]
    async fn test_decode_failure_uses_paired_error_verb() {
        let router = Router::builder().request("Echo", Echo).build().unwrap();
        let (connection, mut rx) = connect(&router);

        call(&router, &connection, r#"Echo {"text":5}"#).await;
        let frame = next_frame(&mut rx).await;
        assert!(frame.starts_with(r#"echoedError {"error":"Invalid arguments for Echo"#));
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_error_frame() {
        let router = Router::builder().observe("Explode", Panicky).build().unwrap();
        let (connection, mut rx) = connect(&router);

        call(&router, &connection, "Explode").await;
        let frame = next_frame(&mut rx).await;
        assert!(frame.starts_with("commandError "));
        assert!(frame.contains("Handler panicked"));
    }

    #[tokio::test]
    async fn test_serial_handler_never_overlaps() {
        let overlap = Overlap::default();
        let router = Router::builder()
            .request("Save", SerialSave(overlap.clone()))
            .build()
            .unwrap();
        let (connection, mut rx) = connect(&router);

        let tasks: Vec<_> = (0..5)
            .filter_map(|_| router.route(&connection, CommandEnvelope::decode("Save {}").unwrap()))
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(overlap.peak.load(Ordering::SeqCst), 1);
        for _ in 0..5 {
            assert_eq!(next_frame(&mut rx).await, "saved {}");
        }
        assert_eq!(router.gates().len(), 1);
    }

    #[derive(Deserialize)]
    struct Numbered {
        n: usize,
    }

    struct OrderedUpdate(Arc<Mutex<Vec<usize>>>);

    #[async_trait]
    impl RequestHandler for OrderedUpdate {
        type Arg = Numbered;
        type Output = Empty;
        const RESULT_VERB: &'static str = "updated";
        const SERIAL: bool = true;

        async fn handle(&self, _ctx: &CallContext, arg: Numbered) -> std::result::Result<Empty, HandlerFault> {
            tokio::task::yield_now().await;
            self.0.lock().push(arg.n);
            Ok(Empty {})
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_serial_calls_run_in_arrival_order() {
        const CALLS: usize = 8;

        for _ in 0..50 {
            let ran = Arc::new(Mutex::new(Vec::new()));
            let router = Router::builder()
                .request("UpdateSettings", OrderedUpdate(Arc::clone(&ran)))
                .build()
                .unwrap();
            let (connection, mut rx) = connect(&router);

            let tasks: Vec<_> = (0..CALLS)
                .filter_map(|n| {
                    let raw = format!(r#"UpdateSettings {{"n":{n}}}"#);
                    router.route(&connection, CommandEnvelope::decode(&raw).unwrap())
                })
                .collect();
            for task in tasks {
                task.await.unwrap();
            }

            assert_eq!(*ran.lock(), (0..CALLS).collect::<Vec<_>>());
            for _ in 0..CALLS {
                assert_eq!(next_frame(&mut rx).await, "updated {}");
            }
        }
    }

    #[tokio::test]
    async fn test_serial_gate_spans_connections() {
        let overlap = Overlap::default();
        let router = Router::builder()
            .request("Save", SerialSave(overlap.clone()))
            .build()
            .unwrap();
        let (first, _rx1) = connect(&router);
        let (second, _rx2) = connect(&router);

        let a = router.route(&first, CommandEnvelope::decode("Save").unwrap()).unwrap();
        let b = router.route(&second, CommandEnvelope::decode("Save").unwrap()).unwrap();
        a.await.unwrap();
        b.await.unwrap();

        assert_eq!(overlap.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_serial_handlers_run_concurrently() {
        let barrier = Arc::new(Barrier::new(2));
        let router = Router::builder()
            .request("Meet", Rendezvous(barrier))
            .build()
            .unwrap();
        let (connection, mut rx) = connect(&router);

        let a = router.route(&connection, CommandEnvelope::decode("Meet").unwrap()).unwrap();
        let b = router.route(&connection, CommandEnvelope::decode("Meet").unwrap()).unwrap();

        // Both calls must be in flight at once to pass the barrier
        tokio::time::timeout(Duration::from_secs(1), async {
            a.await.unwrap();
            b.await.unwrap();
        })
        .await
        .unwrap();
        assert_eq!(next_frame(&mut rx).await, "met {}");
        assert_eq!(next_frame(&mut rx).await, "met {}");
    }

    #[tokio::test]
    async fn test_cancelled_connection_drops_waiting_serial_call() {
        let overlap = Overlap::default();
        let router = Router::builder()
            .request("Save", SerialSave(overlap))
            .build()
            .unwrap();
        let (connection, mut rx) = connect(&router);
        let held = router
            .gates()
            .acquire(GateKey::of::<SerialSave>(), &CancellationToken::new())
            .await
            .unwrap();

        let task = router.route(&connection, CommandEnvelope::decode("Save").unwrap()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        connection.teardown();
        task.await.unwrap();

        router.gates().release(held);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_duplicate_registrations_rejected() {
        let err = Router::builder()
            .request("Echo", Echo)
            .request("echo", Echo)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ChannelError::Registration(_)));

        let err = Router::builder()
            .namespace("Window", Recorder::default())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ChannelError::Registration(_)));
    }
}
