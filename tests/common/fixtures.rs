//! Fetchers and coordinators shared by the integration tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fetch_batch::{
    BatchCoordinator, CallbackFetcher, Completion, Config, FetchError, Item, ItemStatus,
};

/// Source list modelled on a photo album: `count` entries cycling over three images
pub fn photo_sources(base: &str, count: usize) -> Vec<String> {
    let names = ["sunrise.jpg", "harbor.jpg", "forest.jpg"];
    (0..count)
        .map(|i| format!("{}/photos/{}", base, names[i % names.len()]))
        .collect()
}

/// Log of the sources a callback fetcher was started with
pub type StartLog = Arc<Mutex<Vec<String>>>;

/// Coordinator whose fetcher completes from a plain OS thread after `delay`
///
/// Sources containing `broken` complete with a placeholder item and an error.
pub fn threaded_coordinator(config: Config, delay: Duration) -> (BatchCoordinator, StartLog) {
    let started: StartLog = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&started);

    let fetcher = CallbackFetcher::new(move |source: String, done: Completion| {
        log.lock().unwrap().push(source.clone());
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            if source.contains("broken") {
                done.complete(
                    Some(Item::new(source.clone(), None, ItemStatus::Failed)),
                    Some(FetchError::failed(source, "could not decode image")),
                );
            } else {
                let payload = source.clone().into_bytes();
                done.complete(Some(Item::ready(source, payload)), None);
            }
        });
    });

    let coordinator = BatchCoordinator::new(config, fetcher).unwrap();
    (coordinator, started)
}
