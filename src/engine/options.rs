use crate::merge::Coalesce;
use std::sync::Arc;
use std::time::Duration;

/// Fold function applied to queued payloads in arrival order.
///
/// The accumulator is `None` for the first payload of a batch.
pub type Reducer<T> = dyn Fn(Option<T>, T) -> T + Send + Sync;

/// Callback receiving the shared merged result of a batch.
pub type BatchCallback<T> = dyn Fn(Arc<T>) + Send + Sync;

/// Engine-wide aggregation settings. Per-call options merge over these.
pub struct AggregateDefaults<T> {
    /// Reducer used to fold queued payloads.
    pub reducer: Arc<Reducer<T>>,
    /// Delay before a batch auto-closes; zero means "next turn".
    pub duration: Duration,
    /// Whether every submission reschedules the pending timer.
    pub debounce: bool,
    /// Callback substituted for non-primary submissions, when set.
    pub extra: Option<Arc<BatchCallback<T>>>,
    /// Whether non-primary submissions are discarded instead of queued.
    pub noop: bool,
}

impl<T> Clone for AggregateDefaults<T> {
    fn clone(&self) -> Self {
        Self {
            reducer: Arc::clone(&self.reducer),
            duration: self.duration,
            debounce: self.debounce,
            extra: self.extra.clone(),
            noop: self.noop,
        }
    }
}

impl<T: Coalesce + 'static> AggregateDefaults<T> {
    /// Defaults with the shallow field-overwrite merge as reducer.
    pub fn shallow_merge() -> Self {
        Self::with_reducer(|acc, next| T::coalesce(acc, next))
    }
}

impl<T> AggregateDefaults<T> {
    /// Defaults with an explicit reducer, for payload types without a
    /// canonical merge.
    pub fn with_reducer(reducer: impl Fn(Option<T>, T) -> T + Send + Sync + 'static) -> Self {
        Self {
            reducer: Arc::new(reducer),
            duration: Duration::ZERO,
            debounce: false,
            extra: None,
            noop: false,
        }
    }
}

/// Per-call overrides for a single `submit`. Unset fields fall back to the
/// engine defaults.
pub struct AggregateOptions<T> {
    pub reducer: Option<Arc<Reducer<T>>>,
    pub duration: Option<Duration>,
    pub debounce: Option<bool>,
    pub extra: Option<Arc<BatchCallback<T>>>,
    pub noop: Option<bool>,
}

impl<T> Default for AggregateOptions<T> {
    fn default() -> Self {
        Self {
            reducer: None,
            duration: None,
            debounce: None,
            extra: None,
            noop: None,
        }
    }
}

impl<T> Clone for AggregateOptions<T> {
    fn clone(&self) -> Self {
        Self {
            reducer: self.reducer.clone(),
            duration: self.duration,
            debounce: self.debounce,
            extra: self.extra.clone(),
            noop: self.noop,
        }
    }
}

impl<T> AggregateOptions<T> {
    pub fn with_reducer(
        mut self,
        reducer: impl Fn(Option<T>, T) -> T + Send + Sync + 'static,
    ) -> Self {
        self.reducer = Some(Arc::new(reducer));
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_debounce(mut self, debounce: bool) -> Self {
        self.debounce = Some(debounce);
        self
    }

    pub fn with_extra(mut self, extra: impl Fn(Arc<T>) + Send + Sync + 'static) -> Self {
        self.extra = Some(Arc::new(extra));
        self
    }

    pub fn with_noop(mut self, noop: bool) -> Self {
        self.noop = Some(noop);
        self
    }

    pub(crate) fn merged_over(&self, defaults: &AggregateDefaults<T>) -> AggregateDefaults<T> {
        AggregateDefaults {
            reducer: self
                .reducer
                .clone()
                .unwrap_or_else(|| Arc::clone(&defaults.reducer)),
            duration: self.duration.unwrap_or(defaults.duration),
            debounce: self.debounce.unwrap_or(defaults.debounce),
            extra: self.extra.clone().or_else(|| defaults.extra.clone()),
            noop: self.noop.unwrap_or(defaults.noop),
        }
    }
}
