use std::time::Duration;

use tokio::io::{self as tokio_io, DuplexStream, ReadHalf, WriteHalf};

use comms::msg::{Command, Response};
use comms::{MsgReceiver, MsgSender};
use coordinator::channel::{Collector, Dispatcher};
use coordinator::error::CoordinatorError;
use coordinator::registry::{Registry, WorkerState};
use coordinator::router::{InferenceReply, InferenceRouter};

type NetRx = MsgReceiver<ReadHalf<DuplexStream>>;
type NetTx = MsgSender<WriteHalf<DuplexStream>>;

struct FakeWorker {
    cmd_rx: NetRx,
    resp_tx: NetTx,
}

struct Harness {
    registry: Registry,
    dispatcher: Dispatcher<WriteHalf<DuplexStream>>,
    collector: Collector,
    workers: Vec<FakeWorker>,
}

fn wire(states: &[WorkerState]) -> Harness {
    let mut registry = Registry::new();
    let mut dispatcher = Dispatcher::new();
    let collector = Collector::new(16);
    let mut workers = Vec::new();

    for (idx, &state) in states.iter().enumerate() {
        let id = idx as u32 + 1;

        let (coord_end, wk_end) = tokio_io::duplex(4096);
        let (rx, tx) = tokio_io::split(coord_end);
        let (_, cmd_tx) = comms::channel(rx, tx);
        let (rx, tx) = tokio_io::split(wk_end);
        let (cmd_rx, _) = comms::channel(rx, tx);

        let (wk_end, coll_end) = tokio_io::duplex(4096);
        let (rx, tx) = tokio_io::split(wk_end);
        let (_, resp_tx) = comms::channel(rx, tx);
        let (rx, tx) = tokio_io::split(coll_end);
        let (coll_rx, _) = comms::channel(rx, tx);

        registry.register(id, format!("10.0.0.{id}:5555"));
        registry.set_state(id, state);
        dispatcher.insert(id, cmd_tx);
        collector.attach(coll_rx);
        workers.push(FakeWorker { cmd_rx, resp_tx });
    }

    Harness {
        registry,
        dispatcher,
        collector,
        workers,
    }
}

#[tokio::test]
async fn router_targets_only_the_inference_ready_worker() {
    let mut h = wire(&[WorkerState::Ready, WorkerState::InferenceReady]);
    let mut w2 = h.workers.pop().unwrap();
    let mut w1 = h.workers.pop().unwrap();

    let t2 = tokio::spawn(async move {
        let cmd: Command = w2.cmd_rx.recv().await.unwrap();
        assert_eq!(
            cmd,
            Command::Infer {
                input: "What is diabetes?".to_string(),
            }
        );
        w2.resp_tx
            .send(&Response::InferenceResult {
                client_id: 2,
                output: "Diabetes is a chronic condition...".to_string(),
            })
            .await
            .unwrap();
    });

    let router = InferenceRouter::new(Duration::from_secs(1));
    let reply = router
        .route(
            &h.registry,
            &mut h.dispatcher,
            &mut h.collector,
            "What is diabetes?",
        )
        .await
        .unwrap();

    assert_eq!(
        reply,
        InferenceReply {
            worker_id: 2,
            output: "Diabetes is a chronic condition...".to_string(),
        }
    );

    // Worker 1 never saw an infer command.
    let unseen = tokio::time::timeout(Duration::from_millis(50), w1.cmd_rx.recv::<Command>()).await;
    assert!(unseen.is_err());

    t2.await.unwrap();
}

#[tokio::test]
async fn route_fails_when_no_worker_is_ready() {
    let mut h = wire(&[WorkerState::Ready, WorkerState::TrainingFailed]);

    let router = InferenceRouter::new(Duration::from_millis(100));
    let err = router
        .route(&h.registry, &mut h.dispatcher, &mut h.collector, "hello")
        .await
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::NoWorkersAvailable));
}

#[tokio::test]
async fn inference_error_is_surfaced_without_evicting_the_worker() {
    let mut h = wire(&[WorkerState::InferenceReady]);
    let mut w1 = h.workers.pop().unwrap();

    let t1 = tokio::spawn(async move {
        let _: Command = w1.cmd_rx.recv().await.unwrap();
        w1.resp_tx
            .send(&Response::InferenceError {
                client_id: 1,
                error: "generation failed".to_string(),
            })
            .await
            .unwrap();

        let _: Command = w1.cmd_rx.recv().await.unwrap();
        w1.resp_tx
            .send(&Response::InferenceResult {
                client_id: 1,
                output: "better luck".to_string(),
            })
            .await
            .unwrap();
    });

    let router = InferenceRouter::new(Duration::from_secs(1));
    let err = router
        .route(&h.registry, &mut h.dispatcher, &mut h.collector, "q1")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoordinatorError::Worker { worker_id: 1, .. }
    ));
    // A single failed request keeps the worker in rotation.
    assert_eq!(h.registry.state(1), Some(WorkerState::InferenceReady));

    let reply = router
        .route(&h.registry, &mut h.dispatcher, &mut h.collector, "q2")
        .await
        .unwrap();
    assert_eq!(reply.output, "better luck");

    t1.await.unwrap();
}

#[tokio::test]
async fn route_times_out_on_a_silent_worker() {
    let mut h = wire(&[WorkerState::InferenceReady]);
    let _w1 = h.workers.pop().unwrap();

    let router = InferenceRouter::new(Duration::from_millis(100));
    let err = router
        .route(&h.registry, &mut h.dispatcher, &mut h.collector, "anyone?")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoordinatorError::RequestTimeout { worker_id: 1 }
    ));
}

#[tokio::test]
async fn stale_responses_from_other_workers_are_discarded() {
    let mut h = wire(&[WorkerState::InferenceReady, WorkerState::Ready]);
    let mut w2 = h.workers.pop().unwrap();
    let mut w1 = h.workers.pop().unwrap();

    let t1 = tokio::spawn(async move {
        // A stale response from worker 2 lands first; the router must keep
        // waiting for the worker it actually routed to.
        w2.resp_tx
            .send(&Response::Ready { client_id: 2 })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let _: Command = w1.cmd_rx.recv().await.unwrap();
        w1.resp_tx
            .send(&Response::InferenceResult {
                client_id: 1,
                output: "correlated".to_string(),
            })
            .await
            .unwrap();
    });

    let router = InferenceRouter::new(Duration::from_secs(1));
    let reply = router
        .route(&h.registry, &mut h.dispatcher, &mut h.collector, "q")
        .await
        .unwrap();

    assert_eq!(reply.worker_id, 1);
    assert_eq!(reply.output, "correlated");

    t1.await.unwrap();
}
