use kline_core::stream::{PumpTask, Shutdown, StopSignal, shut_down};

mod model {
    use super::*;
    use loom::sync::Arc;
    use loom::sync::atomic::{AtomicBool, Ordering};

    /// A tick pump that may exit on its own (feed closed) at any point.
    #[derive(Clone)]
    pub struct Pump {
        exited: Arc<AtomicBool>,
        aborted: Arc<AtomicBool>,
    }

    impl Pump {
        pub fn new() -> Self {
            Self {
                exited: Arc::new(AtomicBool::new(false)),
                aborted: Arc::new(AtomicBool::new(false)),
            }
        }
        pub fn feed_closed(&self) {
            self.exited.store(true, Ordering::SeqCst);
        }
        pub fn was_aborted(&self) -> bool {
            self.aborted.load(Ordering::SeqCst)
        }
    }

    impl PumpTask for Pump {
        fn abort(&mut self) {
            self.aborted.store(true, Ordering::SeqCst);
        }
        fn is_finished(&self) -> bool {
            self.exited.load(Ordering::SeqCst)
        }
    }

    #[derive(Clone)]
    pub struct Stop {
        fired: Arc<AtomicBool>,
    }

    impl Stop {
        pub fn new() -> Self {
            Self {
                fired: Arc::new(AtomicBool::new(false)),
            }
        }
        pub fn was_fired(&self) -> bool {
            self.fired.load(Ordering::SeqCst)
        }
    }

    impl StopSignal for Stop {
        fn fire(self) {
            self.fired.store(true, Ordering::SeqCst);
        }
    }
}

#[test]
fn pump_closing_concurrently_is_either_exited_or_aborted() {
    loom::model(|| {
        use model::*;

        let pump = Pump::new();
        let stop = Stop::new();
        let feed = pump.clone();
        let t = loom::thread::spawn(move || feed.feed_closed());

        let mut task = Some(pump.clone());
        let mut signal = Some(stop.clone());
        let outcome = shut_down(&mut task, &mut signal);

        assert!(stop.was_fired());
        assert!(task.is_none() && signal.is_none());
        match outcome {
            Shutdown::Exited => assert!(!pump.was_aborted()),
            Shutdown::Aborted => assert!(pump.was_aborted()),
            Shutdown::Released => panic!("task was held"),
        }
        t.join().unwrap();
    });
}

#[test]
fn exited_pump_is_left_alone() {
    loom::model(|| {
        use model::*;

        let pump = Pump::new();
        pump.feed_closed();
        let stop = Stop::new();

        let outcome = shut_down(&mut Some(pump.clone()), &mut Some(stop.clone()));

        assert_eq!(outcome, Shutdown::Exited);
        assert!(stop.was_fired());
        assert!(!pump.was_aborted());
    });
}

#[test]
fn second_shutdown_is_a_no_op() {
    loom::model(|| {
        use model::*;

        let pump = Pump::new();
        let stop = Stop::new();
        let mut task = Some(pump.clone());
        let mut signal = Some(stop);

        assert_eq!(shut_down(&mut task, &mut signal), Shutdown::Aborted);
        assert_eq!(shut_down(&mut task, &mut signal), Shutdown::Released);
        assert!(pump.was_aborted());
    });
}

#[test]
fn missing_stop_signal_still_aborts() {
    loom::model(|| {
        use model::*;

        let pump = Pump::new();
        let mut signal: Option<Stop> = None;
        let outcome = shut_down(&mut Some(pump.clone()), &mut signal);

        assert_eq!(outcome, Shutdown::Aborted);
        assert!(pump.was_aborted());
    });
}
