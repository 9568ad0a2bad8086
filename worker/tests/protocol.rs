use std::{
    collections::{BTreeMap, HashMap},
    io::Cursor,
    num::NonZeroUsize,
    sync::Arc,
    time::Duration,
};

use base64::{Engine, engine::general_purpose::STANDARD};
use comms::{
    Envelope, OnoReceiver, OnoSender, Origin, Request,
    msg::{ClassifierConfig, CreateTrain, CreateTrainClassifier, ImagePredict, PredictionType},
    specs::{
        ColumnSpec, CompileOptions, DataPreparationConfig, Metrics, ModelConfig, Normalization,
        ProblemType, Row, TrainConfig,
    },
};
use image::{ImageFormat, Rgb, RgbImage};
use machine_learning::arch::{LayerSnapshot, ModelSnapshot};
use serde_json::{Value, json};
use tokio::{
    io::{self, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf},
    time,
};
use worker::{Resources, WorkerConfig};

struct Client {
    rx: OnoReceiver<ReadHalf<DuplexStream>>,
    tx: OnoSender<WriteHalf<DuplexStream>>,
}

impl Client {
    /// Connects to a fresh worker and consumes its `init` message.
    async fn connect(config: WorkerConfig) -> Self {
        let (client, server) = io::duplex(1 << 16);
        let (rx, tx) = io::split(server);
        let (rx, tx) = comms::channel(rx, tx);
        tokio::spawn(worker::serve(rx, tx, Arc::new(Resources::new(config))));

        let (rx, tx) = io::split(client);
        let (rx, tx) = comms::channel(rx, tx);
        let mut client = Self { rx, tx };

        let init = client.recv().await;
        assert_eq!(init.kind, "init");
        assert_eq!(init.from, Origin::Worker);
        assert_eq!(init.data["message"], "Worker initialized");
        client
    }

    async fn send(&mut self, model_id: Option<&str>, request: Request) {
        let envelope = request.into_envelope(model_id.map(str::to_string)).unwrap();
        self.tx.send(&envelope).await.unwrap();
    }

    async fn recv(&mut self) -> Envelope {
        time::timeout(Duration::from_secs(120), self.rx.recv::<Envelope>())
            .await
            .expect("the worker did not answer in time")
            .unwrap()
    }

    /// Receives until a `train_end`, returning the updates seen before it and the end.
    async fn until_end(&mut self, model_id: &str) -> (Vec<Envelope>, Envelope) {
        let mut updates = Vec::new();
        loop {
            let envelope = self.recv().await;
            assert_eq!(envelope.model_id.as_deref(), Some(model_id));
            match envelope.kind.as_str() {
                "train_update" => updates.push(envelope),
                "train_end" => return (updates, envelope),
                other => panic!("unexpected `{other}` during training"),
            }
        }
    }
}

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

fn linear_request(epochs: usize) -> Request {
    line_request(20, 2, epochs)
}

fn line_request(rows: i32, slope: i32, epochs: usize) -> Request {
    let data = (0..rows).map(|x| row(json!({"x": x, "y": slope * x + 1}))).collect();

    let mut model_config = ModelConfig::new(vec![4, 1], ProblemType::Regression);
    model_config.compile_options = Some(CompileOptions {
        optimizer: "adam".to_string(),
        learning_rate: 0.01,
        loss_function: None,
        metrics: Metrics::Many(Vec::new()),
    });

    let prep = DataPreparationConfig {
        feature_config: vec![
            ColumnSpec::normalized("x", Normalization::MinMax),
            ColumnSpec::normalized("y", Normalization::MinMax),
        ],
        target_config: ColumnSpec::normalized("y", Normalization::MinMax),
        disabled_columns: Vec::new(),
        test_size: 0.2,
        stratify: false,
        seed: Some(4),
    };

    Request::CreateTrain(Box::new(CreateTrain {
        data,
        columns: Vec::new(),
        model_config,
        train_config: TrainConfig {
            batch_size: NonZeroUsize::new(4).unwrap(),
            epochs,
            shuffle: true,
            validation_split: 0.,
            data_preparation_config: prep,
        },
    }))
}

fn predict_x(x: i32) -> Request {
    Request::Predict {
        inputs: row(json!({ "x": x })),
    }
}

fn png(color: [u8; 3], side: u32) -> String {
    let img = RgbImage::from_pixel(side, side, Rgb(color));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
    STANDARD.encode(bytes)
}

fn assert_error(envelope: &Envelope, model_id: Option<&str>, kind: &str) {
    assert_eq!(envelope.kind, "error");
    assert_eq!(envelope.model_id.as_deref(), model_id);
    assert_eq!(envelope.data["kind"], kind);
    assert!(envelope.message.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn predict_on_unknown_session_fails() {
    let mut client = Client::connect(WorkerConfig::default()).await;

    client.send(Some("ghost"), predict_x(1)).await;
    assert_error(&client.recv().await, Some("ghost"), "session_not_found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_type_is_answered_with_an_error() {
    let mut client = Client::connect(WorkerConfig::default()).await;

    let envelope: Envelope = serde_json::from_value(json!({
        "from": "main",
        "type": "explode",
        "modelId": 7,
    }))
    .unwrap();
    client.tx.send(&envelope).await.unwrap();

    let reply = client.recv().await;
    assert_error(&reply, Some("7"), "configuration");
    assert!(reply.message.unwrap().contains("explode"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn messages_from_other_workers_are_ignored() {
    let mut client = Client::connect(WorkerConfig::default()).await;

    let mut foreign = predict_x(1).into_envelope(Some("a".to_string())).unwrap();
    foreign.from = Origin::Worker;
    client.tx.send(&foreign).await.unwrap();
    client.send(Some("b"), predict_x(1)).await;

    // the only reply belongs to the second message
    assert_error(&client.recv().await, Some("b"), "session_not_found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn create_train_needs_a_model_id() {
    let mut client = Client::connect(WorkerConfig::default()).await;

    client.send(None, linear_request(2)).await;
    assert_error(&client.recv().await, None, "configuration");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trains_then_predicts() {
    let mut client = Client::connect(WorkerConfig::default()).await;

    client.send(Some("m1"), linear_request(10)).await;
    let (updates, end) = client.until_end("m1").await;

    assert_eq!(updates.len(), 10);
    let epochs: Vec<_> = updates
        .iter()
        .map(|u| u.data["transcurredEpochs"].as_u64().unwrap())
        .collect();
    assert_eq!(epochs, (0..10).collect::<Vec<_>>());
    assert_eq!(end.data["status"], "completed");
    assert_eq!(end.data["modelHistory"].as_array().unwrap().len(), 10);
    assert!(end.data["testData"]["data"].is_array());

    client.send(Some("m1"), predict_x(3)).await;
    let reply = client.recv().await;
    assert_eq!(reply.kind, "prediction_result");
    assert_eq!(reply.model_id.as_deref(), Some("m1"));
    assert!(reply.data["prediction"]["predictedClass"].is_number());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_training_ends_the_run_once() {
    let mut client = Client::connect(WorkerConfig::default()).await;

    client.send(Some("long"), linear_request(1_000_000)).await;
    let first = client.recv().await;
    assert_eq!(first.kind, "train_update");

    client.send(Some("long"), Request::StopTraining).await;
    let (_, end) = client.until_end("long").await;
    assert_eq!(end.data["status"], "cancelled");

    // nothing else of the run arrives after its end
    client.send(Some("other"), predict_x(1)).await;
    assert_error(&client.recv().await, Some("other"), "session_not_found");

    // the cancelled run keeps what it learned
    client.send(Some("long"), predict_x(1)).await;
    assert_eq!(client.recv().await.kind, "prediction_result");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retraining_cancels_the_previous_run_first() {
    let mut client = Client::connect(WorkerConfig::default()).await;

    client.send(Some("m"), linear_request(1_000_000)).await;
    client.send(Some("m"), linear_request(3)).await;

    let (_, first) = client.until_end("m").await;
    assert_eq!(first.data["status"], "cancelled");

    let (updates, second) = client.until_end("m").await;
    assert_eq!(updates.len(), 3);
    assert_eq!(second.data["status"], "completed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retraining_after_remove_waits_for_the_removed_run() {
    let mut client = Client::connect(WorkerConfig::default()).await;

    client.send(Some("m"), linear_request(1_000_000)).await;
    assert_eq!(client.recv().await.kind, "train_update");

    client.send(Some("m"), Request::Remove).await;
    client.send(Some("m"), linear_request(3)).await;

    let (_, removed) = client.until_end("m").await;
    assert_eq!(removed.data["status"], "cancelled");

    let (updates, retrained) = client.until_end("m").await;
    let epochs: Vec<_> = updates
        .iter()
        .map(|u| u.data["transcurredEpochs"].as_u64().unwrap())
        .collect();
    assert_eq!(epochs, vec![0, 1, 2]);
    assert_eq!(retrained.data["status"], "completed");

    client.send(Some("m"), predict_x(1)).await;
    assert_eq!(client.recv().await.kind, "prediction_result");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_sessions_keep_their_own_progress() {
    let mut client = Client::connect(WorkerConfig::default()).await;

    let epochs = HashMap::from([("a", 12_u64), ("b", 7_u64)]);
    client.send(Some("a"), line_request(25, 2, 12)).await;
    client.send(Some("b"), line_request(40, -3, 7)).await;

    let mut seen: HashMap<String, Vec<u64>> = HashMap::new();
    let mut ends: HashMap<String, Envelope> = HashMap::new();
    while ends.len() < 2 {
        let envelope = client.recv().await;
        let id = envelope.model_id.clone().unwrap();
        assert!(!ends.contains_key(&id), "`{id}` published after its end");

        match envelope.kind.as_str() {
            "train_update" => {
                let epoch = envelope.data["transcurredEpochs"].as_u64().unwrap();
                seen.entry(id).or_default().push(epoch);
            }
            "train_end" => {
                ends.insert(id, envelope);
            }
            other => panic!("unexpected `{other}` during training"),
        }
    }

    for (id, expected) in &epochs {
        let updates = &seen[*id];
        assert!(updates.windows(2).all(|w| w[0] < w[1]), "`{id}` epochs out of order");
        assert_eq!(updates.len() as u64, *expected);

        let end = &ends[*id];
        assert_eq!(end.data["status"], "completed");
        assert_eq!(end.data["modelHistory"].as_array().unwrap().len() as u64, *expected);
    }

    for id in ["a", "b"] {
        client.send(Some(id), predict_x(5)).await;
        let reply = client.recv().await;
        assert_eq!(reply.kind, "prediction_result");
        assert_eq!(reply.model_id.as_deref(), Some(id));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_frames_close_the_connection() {
    let (client, server) = io::duplex(1 << 16);
    let (rx, tx) = io::split(server);
    let (rx, tx) = comms::channel(rx, tx);
    let resources = Arc::new(Resources::new(WorkerConfig::default()));
    let serving = tokio::spawn(worker::serve(rx, tx, resources));

    let (rx, mut raw_tx) = io::split(client);
    let (mut rx, _) = comms::channel(rx, io::sink());
    assert_eq!(rx.recv::<Envelope>().await.unwrap().kind, "init");

    raw_tx.write_all(&(1u64 << 40).to_be_bytes()).await.unwrap();

    let reply: Envelope = rx.recv().await.unwrap();
    assert_error(&reply, None, "configuration");
    assert!(serving.await.unwrap().is_err());

    let closed = rx.recv::<Envelope>().await.unwrap_err();
    assert_eq!(closed.kind(), std::io::ErrorKind::UnexpectedEof);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn removed_sessions_are_gone() {
    let mut client = Client::connect(WorkerConfig::default()).await;

    client.send(Some("m"), linear_request(2)).await;
    client.until_end("m").await;

    client.send(Some("m"), Request::Remove).await;
    client.send(Some("m"), predict_x(1)).await;
    assert_error(&client.recv().await, Some("m"), "session_not_found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn loads_and_serves_the_digit_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("digits.json");

    let mut biases = vec![0.; 10];
    biases[7] = 6.;
    ModelSnapshot {
        layers: vec![LayerSnapshot {
            input: 784,
            units: 10,
            activation: comms::specs::ActivationSpec::Softmax,
            weights: vec![0.; 7840],
            biases,
        }],
    }
    .save(&path)
    .unwrap();

    let config = WorkerConfig {
        digit_model_path: Some(path),
        ..Default::default()
    };
    let mut client = Client::connect(config).await;

    let load = || Request::LoadRemoteModel {
        kind: "mnist".to_string(),
    };
    client.send(None, load()).await;
    let loaded = client.recv().await;
    assert_eq!(loaded.kind, "model_loaded");
    assert_eq!(loaded.model_id.as_deref(), Some("mnist"));
    assert_eq!(loaded.data["success"], true);

    let predict = Request::ImagePredict(ImagePredict {
        image: png([255, 255, 255], 28),
        prediction_type: Some(PredictionType::Mnist),
    });
    client.send(Some("mnist"), predict).await;
    let reply = client.recv().await;
    assert_eq!(reply.kind, "image_prediction_result");
    assert_eq!(reply.data["prediction"]["predictedClass"], 7);
    assert_eq!(reply.data["prediction"]["probabilities"].as_array().unwrap().len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_models_fail_gracefully() {
    let mut client = Client::connect(WorkerConfig::default()).await;

    client
        .send(None, Request::LoadRemoteModel { kind: "mnist".to_string() })
        .await;
    let loaded = client.recv().await;
    assert_eq!(loaded.kind, "model_loaded");
    assert_eq!(loaded.data["success"], false);
    assert!(loaded.data["message"].is_string());

    client
        .send(None, Request::LoadRemoteModel { kind: "resnet".to_string() })
        .await;
    assert_error(&client.recv().await, None, "configuration");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trains_and_serves_an_image_classifier() {
    let mut client = Client::connect(WorkerConfig::default()).await;

    client.send(None, Request::LoadFeatureExtractor).await;
    let loaded = client.recv().await;
    assert_eq!(loaded.kind, "mobilenet_loaded");
    assert_eq!(loaded.data["success"], true);

    let inputs = vec![
        BTreeMap::from([("red".to_string(), vec![png([250, 10, 10], 12); 6])]),
        BTreeMap::from([("blue".to_string(), vec![png([10, 10, 250], 12); 6])]),
    ];
    let request = Request::CreateTrainClassifier(CreateTrainClassifier {
        inputs,
        model_config: ClassifierConfig { epochs: Some(5) },
    });
    client.send(Some("colors"), request).await;

    let (updates, end) = client.until_end("colors").await;
    assert_eq!(updates.len(), 5);
    assert_eq!(end.data["status"], "completed");

    let predict = Request::ImagePredict(ImagePredict {
        image: png([240, 20, 20], 12),
        prediction_type: None,
    });
    client.send(Some("colors"), predict).await;
    let reply = client.recv().await;
    assert_eq!(reply.kind, "image_prediction_result");
    assert_eq!(reply.data["prediction"]["labels"], json!(["red", "blue"]));
    assert!(["red", "blue"].contains(&reply.data["prediction"]["predictedClass"].as_str().unwrap()));
}
