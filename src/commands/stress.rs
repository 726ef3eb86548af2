use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use unionlayer::config::load_config;
use unionlayer::{LayerError, LayerStore, Mode, Result};

const STRESS_LAYER: &str = "stress";
const STRESS_PATH: &str = "/stress/target";

/// Run `threads` workers that each resolve and release the same inode
/// `iterations` times, then verify the reference count came back to where
/// it started.
pub fn run_stress(threads: usize, iterations: usize, sweep: bool) -> Result<()> {
    let config = load_config()?;
    let store = LayerStore::from_config(&config.engine);
    store.create_layer(STRESS_LAYER, None)?;

    let anchor = store.resolve(STRESS_PATH, true, Mode::regular(0o644))?;
    let baseline = anchor.ref_count();

    let running = Arc::new(AtomicBool::new(true));
    let sweeper = sweep.then(|| {
        let store = store.clone();
        let running = running.clone();
        thread::spawn(move || {
            let mut sweeps = 0usize;
            while running.load(Ordering::Relaxed) {
                store.sweep();
                sweeps += 1;
                thread::yield_now();
            }
            sweeps
        })
    });

    let started = Instant::now();
    let workers: Vec<_> = (0..threads)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || -> Result<()> {
                for _ in 0..iterations {
                    let handle = store.resolve(STRESS_PATH, false, Mode::regular(0))?;
                    store.release(handle);
                }
                Ok(())
            })
        })
        .collect();

    let mut failure = None;
    for worker in workers {
        match worker.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => failure = Some(e),
            Err(_) => {
                failure = Some(LayerError::InvalidOperation(
                    "stress worker panicked".to_string(),
                ))
            }
        }
    }
    let elapsed = started.elapsed();

    running.store(false, Ordering::Relaxed);
    let sweeps = match sweeper.map(|s| s.join()) {
        Some(Ok(count)) => count,
        Some(Err(_)) => {
            return Err(LayerError::InvalidOperation(
                "sweeper thread panicked".to_string(),
            ))
        }
        None => 0,
    };

    if let Some(e) = failure {
        return Err(e);
    }

    let final_count = anchor.ref_count();
    let pairs = threads * iterations;
    println!(
        "{} resolve/release pairs on {} threads in {:.2?} ({} sweeps)",
        pairs, threads, elapsed, sweeps
    );
    println!("ref count: before={} after={}", baseline, final_count);

    if final_count != baseline {
        return Err(LayerError::InvalidOperation(format!(
            "reference count drifted from {} to {}",
            baseline, final_count
        )));
    }
    println!("\u{2713} reference count preserved");
    Ok(())
}
