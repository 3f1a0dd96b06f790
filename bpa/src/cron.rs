use super::*;
use futures::future::BoxFuture;
use std::{
    collections::HashMap,
    sync::Mutex,
    time::Duration,
};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

#[derive(Debug, Error)]
pub enum Error {
    #[error("a job named {0} is already registered")]
    DuplicateName(String),
}

pub type JobFn = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct Job {
    period: Duration,
    next: Instant,
    f: JobFn,
}

/// Named periodic jobs driven by a single scheduler task.
///
/// Jobs run sequentially in registration-name order; a long-running job
/// delays later fires but never drops them, because each job's next fire
/// time advances by exactly one period per run. Shutdown waits for the
/// current job to complete.
pub struct Cron {
    jobs: Arc<Mutex<HashMap<String, Job>>>,
    notify: Arc<tokio::sync::Notify>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl Cron {
    pub fn new() -> Self {
        let jobs = Arc::new(Mutex::new(HashMap::new()));
        let notify = Arc::new(tokio::sync::Notify::new());
        let cancel = CancellationToken::new();
        let tasks = TaskTracker::new();

        tasks.spawn(Self::run(jobs.clone(), notify.clone(), cancel.clone()));

        Self {
            jobs,
            notify,
            cancel,
            tasks,
        }
    }

    pub fn register(&self, name: &str, period: Duration, f: JobFn) -> Result<(), Error> {
        {
            let mut jobs = self.jobs.lock().expect("job table lock poisoned");
            if jobs.contains_key(name) {
                return Err(Error::DuplicateName(name.to_string()));
            }
            jobs.insert(
                name.to_string(),
                Job {
                    period,
                    next: Instant::now() + period,
                    f,
                },
            );
        }
        debug!("registered cron job {name} with period {period:?}");
        self.notify.notify_one();
        Ok(())
    }

    /// Idempotent.
    pub fn unregister(&self, name: &str) {
        self.jobs
            .lock()
            .expect("job table lock poisoned")
            .remove(name);
        self.notify.notify_one();
    }

    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }

    async fn run(
        jobs: Arc<Mutex<HashMap<String, Job>>>,
        notify: Arc<tokio::sync::Notify>,
        cancel: CancellationToken,
    ) {
        loop {
            let next_fire = jobs
                .lock()
                .expect("job table lock poisoned")
                .values()
                .map(|j| j.next)
                .min();

            tokio::select! {
                _ = cancel.cancelled() => return,
                // a register/unregister changed the schedule
                _ = notify.notified() => continue,
                _ = async {
                    match next_fire {
                        Some(t) => tokio::time::sleep_until(t).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {}
            }

            let now = Instant::now();
            let mut due = jobs
                .lock()
                .expect("job table lock poisoned")
                .iter()
                .filter(|(_, j)| j.next <= now)
                .map(|(name, _)| name.clone())
                .collect::<Vec<_>>();
            due.sort();

            for name in due {
                if cancel.is_cancelled() {
                    return;
                }

                let fut = {
                    let mut jobs = jobs.lock().expect("job table lock poisoned");
                    match jobs.get_mut(&name) {
                        Some(job) => {
                            job.next += job.period;
                            Some((job.f)())
                        }
                        // unregistered since we collected the name
                        None => None,
                    }
                };

                if let Some(fut) = fut {
                    trace!("running cron job {name}");
                    fut.await;
                }
            }
        }
    }
}

impl Default for Cron {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_job(counter: Arc<AtomicUsize>) -> JobFn {
        Box::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn jobs_fire_periodically() {
        let cron = Cron::new();
        let counter = Arc::new(AtomicUsize::new(0));
        cron.register(
            "tick",
            Duration::from_millis(20),
            counting_job(counter.clone()),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(110)).await;
        let fired = counter.load(Ordering::SeqCst);
        assert!((3..=6).contains(&fired), "fired {fired} times");

        cron.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let cron = Cron::new();
        let counter = Arc::new(AtomicUsize::new(0));
        cron.register("job", Duration::from_secs(10), counting_job(counter.clone()))
            .unwrap();
        assert!(matches!(
            cron.register("job", Duration::from_secs(10), counting_job(counter)),
            Err(Error::DuplicateName(_))
        ));
        cron.shutdown().await;
    }

    #[tokio::test]
    async fn unregister_is_idempotent_and_stops_fires() {
        let cron = Cron::new();
        let counter = Arc::new(AtomicUsize::new(0));
        cron.register(
            "tick",
            Duration::from_millis(10),
            counting_job(counter.clone()),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(35)).await;
        cron.unregister("tick");
        cron.unregister("tick");

        let after_unregister = counter.load(Ordering::SeqCst);
        assert!(after_unregister >= 1);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_unregister);

        cron.shutdown().await;
    }

    #[tokio::test]
    async fn slow_jobs_delay_but_do_not_drop_fires() {
        let cron = Cron::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let slow_counter = counter.clone();
        cron.register(
            "slow",
            Duration::from_millis(10),
            Box::new(move || {
                let counter = slow_counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(25)).await;
                }
                .boxed()
            }),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        cron.shutdown().await;

        // every elapsed period eventually produces a fire even though each
        // run overshoots its period
        assert!(counter.load(Ordering::SeqCst) >= 3);
    }
}
