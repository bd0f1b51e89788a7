//! Station abstraction and runner for the pipeline execution contexts.
//!
//! Each station runs on its own thread, receives inputs from a channel,
//! and fans out zero or more outputs per input. Suspension happens only at
//! the channel receive; a `process` call runs to completion.

use crate::pipeline::error::{ErrorReporter, StationError};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A processing stage in the pipeline.
pub trait Station: Send + 'static {
    /// The input type this station receives.
    type Input: Send + 'static;
    /// The output type this station produces.
    type Output: Send + 'static;

    /// Processes a single input item, producing any number of outputs.
    fn process(&mut self, input: Self::Input) -> Result<Vec<Self::Output>, StationError>;

    /// Returns the name of this station for error reporting.
    fn name(&self) -> &'static str;

    /// Called when the station is shutting down.
    fn shutdown(&mut self) {}
}

/// Runs a station in a dedicated thread.
pub struct StationRunner {
    handle: Option<JoinHandle<()>>,
    station_name: &'static str,
}

impl StationRunner {
    /// Spawns the station; it runs until its input channel closes, a fatal
    /// error occurs, or the downstream channel closes.
    pub fn spawn<S: Station>(
        mut station: S,
        input_rx: Receiver<S::Input>,
        output_tx: Sender<S::Output>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let station_name = station.name();

        let handle = thread::spawn(move || {
            'recv: while let Ok(input) = input_rx.recv() {
                match station.process(input) {
                    Ok(outputs) => {
                        for output in outputs {
                            if output_tx.send(output).is_err() {
                                // Downstream gone; shut down
                                break 'recv;
                            }
                        }
                    }
                    Err(StationError::Recoverable(msg)) => {
                        reporter.report(station.name(), &StationError::Recoverable(msg));
                    }
                    Err(StationError::Fatal(msg)) => {
                        reporter.report(station.name(), &StationError::Fatal(msg));
                        break;
                    }
                }
            }
            station.shutdown();
        });

        Self {
            handle: Some(handle),
            station_name,
        }
    }

    /// Waits for the station thread to complete.
    pub fn join(mut self) -> Result<(), String> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| format!("Station '{}' thread panicked", self.station_name))
        } else {
            Ok(())
        }
    }

    /// Returns the name of the station.
    pub fn name(&self) -> &'static str {
        self.station_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    // Splits integers into that many copies
    struct RepeatStation;

    impl Station for RepeatStation {
        type Input = i32;
        type Output = i32;

        fn process(&mut self, input: i32) -> Result<Vec<i32>, StationError> {
            Ok(vec![input; input as usize])
        }

        fn name(&self) -> &'static str {
            "repeat"
        }
    }

    struct FailingStation {
        fail_on: i32,
        fatal: bool,
        shutdown_called: Arc<AtomicBool>,
    }

    impl Station for FailingStation {
        type Input = i32;
        type Output = i32;

        fn process(&mut self, input: i32) -> Result<Vec<i32>, StationError> {
            if input == self.fail_on {
                if self.fatal {
                    Err(StationError::Fatal(format!("fatal on {input}")))
                } else {
                    Err(StationError::Recoverable(format!("failed on {input}")))
                }
            } else {
                Ok(vec![input])
            }
        }

        fn name(&self) -> &'static str {
            "failing"
        }

        fn shutdown(&mut self) {
            self.shutdown_called.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct MockReporter {
        errors: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl ErrorReporter for MockReporter {
        fn report(&self, station: &str, error: &StationError) {
            let mut errors = self.errors.lock().unwrap();
            errors.push((station.to_string(), error.to_string()));
        }
    }

    #[test]
    fn test_fan_out_processing() {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, output_rx) = bounded(10);
        let runner = RepeatStation;
        let runner =
            StationRunner::spawn(runner, input_rx, output_tx, Arc::new(MockReporter::default()));

        input_tx.send(2).unwrap();
        input_tx.send(0).unwrap(); // produces nothing
        input_tx.send(1).unwrap();
        drop(input_tx);

        let outputs: Vec<i32> = output_rx.iter().collect();
        assert_eq!(outputs, vec![2, 2, 1]);
        runner.join().unwrap();
    }

    #[test]
    fn test_recoverable_error_continues() {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, output_rx) = bounded(10);
        let reporter = Arc::new(MockReporter::default());
        let errors = reporter.errors.clone();
        let shutdown = Arc::new(AtomicBool::new(false));

        let station = FailingStation {
            fail_on: 2,
            fatal: false,
            shutdown_called: shutdown.clone(),
        };
        let runner = StationRunner::spawn(station, input_rx, output_tx, reporter);

        for i in 1..=3 {
            input_tx.send(i).unwrap();
        }
        drop(input_tx);

        let outputs: Vec<i32> = output_rx.iter().collect();
        assert_eq!(outputs, vec![1, 3]);

        let reported = errors.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].1.contains("failed on 2"));
        drop(reported);

        runner.join().unwrap();
        assert!(shutdown.load(Ordering::SeqCst));
    }

    #[test]
    fn test_fatal_error_stops_station() {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, output_rx) = bounded(10);
        let reporter = Arc::new(MockReporter::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let station = FailingStation {
            fail_on: 2,
            fatal: true,
            shutdown_called: shutdown.clone(),
        };
        let runner = StationRunner::spawn(station, input_rx, output_tx, reporter);

        for i in 1..=3 {
            input_tx.send(i).unwrap();
        }
        drop(input_tx);

        let outputs: Vec<i32> = output_rx.iter().collect();
        assert_eq!(outputs, vec![1]);

        runner.join().unwrap();
        assert!(shutdown.load(Ordering::SeqCst));
    }

    #[test]
    fn test_shutdown_on_closed_input() {
        let (input_tx, input_rx) = bounded::<i32>(10);
        let (output_tx, _output_rx) = bounded(10);
        let shutdown = Arc::new(AtomicBool::new(false));

        let station = FailingStation {
            fail_on: -1,
            fatal: false,
            shutdown_called: shutdown.clone(),
        };
        let runner =
            StationRunner::spawn(station, input_rx, output_tx, Arc::new(MockReporter::default()));

        drop(input_tx);
        runner.join().unwrap();
        assert!(shutdown.load(Ordering::SeqCst));
    }
}
