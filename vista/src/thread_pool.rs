//! Data parallel fork-join pool.
//!
//! Tasks of a batch are independent and usually work on disjoint ranges of
//! the same arrays. [`TaskBatch::process`] returns only once every task has
//! run.

use rayon::ThreadPoolBuilder;

use crate::error::ThreadPoolError;

type BoxedTask<'a, R> = Box<dyn FnOnce() -> R + Send + 'a>;

/// Fixed size pool of worker threads.
pub struct ThreadPool {
    inner: rayon::ThreadPool,
    thread_count: usize,
}

impl ThreadPool {
    /// Creates a pool with `thread_count` workers, or one per hardware thread
    /// when `None`. There is always at least one worker.
    pub fn new(thread_count: Option<usize>) -> Result<Self, ThreadPoolError> {
        if thread_count == Some(0) {
            log::warn!("Thread pool requested with zero threads, using one");
        }
        let thread_count = thread_count.unwrap_or_else(num_cpus::get).max(1);

        let inner = ThreadPoolBuilder::new()
            .num_threads(thread_count)
            .thread_name(|idx| format!("vista-worker-{idx}"))
            .build()
            .map_err(ThreadPoolError::Build)?;

        log::debug!("Created thread pool with {thread_count} workers");

        Ok(Self { inner, thread_count })
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Determines how many tasks `item_count` items split into when every
    /// task takes `split_count` items.
    ///
    /// If that would need more tasks than there are threads, the task count is
    /// clamped to the thread count and `split_count` is recomputed as
    /// `item_count / thread_count`. The last task is expected to take the
    /// remainder.
    pub fn thread_count_and_split_count(&self, item_count: usize, split_count: &mut usize) -> usize {
        debug_assert_ne!(*split_count, 0, "split count must not be zero");
        *split_count = (*split_count).max(1);

        let mut thread_count = crate::util::math::round_up_div(item_count, *split_count);
        if thread_count > self.thread_count {
            thread_count = self.thread_count;
            *split_count = item_count / thread_count;
        }
        thread_count
    }

    /// Starts an empty batch of tasks returning `R`.
    pub fn batch<'a, R: Send + 'a>(&'a self) -> TaskBatch<'a, R> {
        TaskBatch {
            pool: self,
            tasks: Vec::new(),
        }
    }
}

/// Queue of tasks waiting for [`TaskBatch::process`].
pub struct TaskBatch<'a, R> {
    pool: &'a ThreadPool,
    tasks: Vec<BoxedTask<'a, R>>,
}

impl<'a, R: Send + 'a> TaskBatch<'a, R> {
    pub fn queue_task(&mut self, task: impl FnOnce() -> R + Send + 'a) {
        self.tasks.push(Box::new(task));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs every queued task and blocks until all of them finished.
    ///
    /// Tasks run in waves of at most `thread_count` tasks. A wave of a single
    /// task runs on the calling thread. Results are returned in queue order.
    /// A panicking task takes the caller down with it.
    pub fn process(self) -> Vec<R> {
        profiling::scope!("ThreadPool::process");

        let task_count = self.tasks.len();
        let wave_size = self.pool.thread_count;
        let mut results = Vec::with_capacity(task_count);
        let mut tasks = self.tasks.into_iter();

        loop {
            let wave: Vec<BoxedTask<'a, R>> = tasks.by_ref().take(wave_size).collect();
            match wave.len() {
                0 => break,
                1 => results.extend(wave.into_iter().map(|task| task())),
                len => {
                    let mut outputs: Vec<Option<R>> = (0..len).map(|_| None).collect();
                    self.pool.inner.scope(|scope| {
                        for (task, output) in wave.into_iter().zip(outputs.iter_mut()) {
                            scope.spawn(move |_| *output = Some(task()));
                        }
                    });
                    results.extend(outputs.into_iter().flatten());
                }
            }
        }

        debug_assert_eq!(results.len(), task_count);
        results
    }
}
