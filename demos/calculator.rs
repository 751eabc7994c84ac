use fabric_worker::{DeliveryOptions, InMemoryFabric, LifecycleEvent, Messages, Worker};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Serialize)]
struct Happening {
    what: String,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let fabric = Arc::new(InMemoryFabric::new());

    // Define the messages that this worker supports.
    let messages = Messages::new()
        .handle("calculator.multiply", |parameters, reply| {
            log::info!("received calculator.multiply with parameters {parameters}");
            let product: i64 = parameters
                .as_array()
                .map(|values| values.iter().filter_map(|v| v.as_i64()).product())
                .unwrap_or(1);
            reply.resolve(json!(product));
        })
        .handle("something.happened", |parameters, reply| {
            log::info!("received something.happened event with content {parameters}");
            reply.resolve(json!(null));
        });

    let worker = Worker::new("myWorker", fabric, messages).expect("worker definition is valid");

    let mut notifications = worker.notifications();
    worker.start().await.expect("worker failed to start");
    if let Ok(LifecycleEvent::Ready) = notifications.recv().await {
        log::info!("worker '{}' is ready", worker.name());
    }

    let reply = worker
        .request(
            "calculator.multiply",
            json!([1, 2, 3, 4, 5, 6]),
            DeliveryOptions::default(),
        )
        .await
        .expect("request failed");
    log::info!("the multiplication of 1, 2, 3, 4, 5 and 6 is {reply}");

    let event = serde_json::to_value(Happening {
        what: "multiplication".into(),
    })
    .expect("event serializes");
    worker
        .publish("something.happened", event, DeliveryOptions::default())
        .await
        .expect("publish failed");

    worker.stop().await.expect("worker failed to stop");
}
