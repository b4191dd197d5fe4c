//! Photo album loader example
//!
//! Loads nine photos (three distinct images, repeated) through a simulated
//! callback-based image loader. Tasks after the first three are withdrawn at
//! random before they start, the way a user scrolling away would cancel them.
//!
//! Run with:
//!
//! ```bash
//! cargo run --example photo_batch
//! ```

use std::time::Duration;

use fetch_batch::{
    BatchCoordinator, BatchOptions, CallbackFetcher, Completion, Config, DispatchClass,
    EventKind, Item, RandomCancel, TaskState,
};
use futures::StreamExt;

const PHOTOS: [&str; 3] = [
    "https://photos.example.com/success-kid.jpg",
    "https://photos.example.com/overly-attached-girlfriend.jpg",
    "https://photos.example.com/philosoraptor.jpg",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .compact()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // Simulated loader: completes from its own thread after a short delay
    let loader = CallbackFetcher::new(|source: String, done: Completion| {
        std::thread::spawn(move || {
            let delay = 50 + (source.len() as u64 % 7) * 20;
            std::thread::sleep(Duration::from_millis(delay));
            let pixels = format!("pixels of {}", source).into_bytes();
            done.complete(Some(Item::ready(source, pixels)), None);
        });
    });

    let config = Config {
        max_concurrent_fetches: 3,
        ..Default::default()
    };
    let coordinator = BatchCoordinator::new(config, loader)?;

    // Album view - redraws whenever a photo lands
    let _album = coordinator.subscribe(EventKind::ContentAdded, || {
        println!("[album] new photo, redrawing");
    });

    // Status bar - only cares about whole batches
    let mut updates = Box::pin(coordinator.notifier().stream(EventKind::ContentUpdated));
    tokio::spawn(async move {
        while updates.next().await.is_some() {
            println!("[status] batch finished");
        }
    });

    let sources: Vec<&str> = (0..9).map(|i| PHOTOS[i % PHOTOS.len()]).collect();
    let handle = coordinator
        .run_batch_with(
            sources,
            BatchOptions::default()
                .with_class(DispatchClass::UserInitiated)
                .with_policy(RandomCancel::new(0.5, 3)),
            |error| match error {
                Some(e) => println!("[done] album loaded with error: {}", e),
                None => println!("[done] album loaded"),
            },
        )
        .await?;

    for task in handle.tasks() {
        if task.state() == TaskState::Cancelled {
            println!("[album] photo {} withdrawn before loading", task.index());
        }
    }

    let outcome = handle.wait().await?;
    println!(
        "{} scheduled, {} loaded, {} withdrawn, {} photos in album",
        outcome.scheduled,
        outcome.completed,
        outcome.cancelled,
        coordinator.collection().len()
    );

    coordinator.shutdown().await;
    Ok(())
}
