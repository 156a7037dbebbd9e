//! # Jobs
//!
//! A [`Job`] is the envelope modules use to hand work to each other through the
//! router. It is built once by the producer and then only moved: through the
//! router's inbox, through the `assigning_job` hook, into a module's inbox and
//! finally into exactly one solver.
//!
//! ## Ordering
//!
//! Jobs order **by priority only**; a lower number means more urgent. Two jobs with
//! the same priority compare equal regardless of their goal or payload. The
//! [`Inbox`](crate::Inbox) breaks those ties by insertion order.
//!
//! ```rust
//! use ecu_framework::Job;
//!
//! let urgent = Job::new("read", "sensor-1").with_priority(0);
//! let routine = Job::new("store", "sensor-1");
//! assert!(urgent < routine);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Priority given to jobs that don't ask for one.
pub const DEFAULT_PRIORITY: i32 = 1;

/// The kind of work a job requests. Always stored lowercase; used as the solver key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct Goal(Cow<'static, str>);

impl Goal {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Cow::Owned(name.as_ref().to_lowercase()))
    }

    /// Builds a goal from a name that is already lowercase, without allocating.
    pub fn from_static(name: &'static str) -> Self {
        if name.chars().any(char::is_uppercase) {
            Self::new(name)
        } else {
            Self(Cow::Borrowed(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Goal({})", self.0)
    }
}

impl From<&str> for Goal {
    fn from(name: &str) -> Self {
        Goal::new(name)
    }
}

impl From<String> for Goal {
    fn from(name: String) -> Self {
        Goal::new(name)
    }
}

impl From<Goal> for String {
    fn from(goal: Goal) -> Self {
        goal.0.into_owned()
    }
}

/// Tag naming a kind of module (`"sensor"`, `"logger"`, ...). Jobs use it to name
/// their intended recipient; the router looks modules up by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleType(String);

impl ModuleType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleType {
    fn from(name: &str) -> Self {
        ModuleType::new(name)
    }
}

impl From<String> for ModuleType {
    fn from(name: String) -> Self {
        ModuleType::new(name)
    }
}

/// Callback a producer attaches to a job.
///
/// The framework only carries it; solvers decide whether and when to call
/// [`Subscription::notify`].
#[derive(Clone)]
pub struct Subscription(Arc<dyn Fn(&Job) + Send + Sync>);

impl Subscription {
    pub fn new(callback: impl Fn(&Job) + Send + Sync + 'static) -> Self {
        Self(Arc::new(callback))
    }

    pub fn notify(&self, job: &Job) {
        (self.0)(job)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Subscription(..)")
    }
}

/// A prioritized unit of work addressed (optionally) to a module type.
#[derive(Debug, Clone)]
pub struct Job {
    goal: Goal,
    producer: String,
    data: Option<Value>,
    target: Option<ModuleType>,
    priority: i32,
    subscription: Option<Subscription>,
}

impl Job {
    /// Creates a job with default priority and no payload, target or subscription.
    pub fn new(goal: impl Into<Goal>, producer: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            producer: producer.into(),
            data: None,
            target: None,
            priority: DEFAULT_PRIORITY,
            subscription: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_target(mut self, target: impl Into<ModuleType>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_subscription(mut self, subscription: Subscription) -> Self {
        self.subscription = Some(subscription);
        self
    }

    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    pub fn producer(&self) -> &str {
        &self.producer
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn target(&self) -> Option<&ModuleType> {
        self.target.as_ref()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.cmp(&other.priority)
    }
}

/// Declares an application goal enum whose variants map to lowercase goal names.
///
/// ```rust
/// use ecu_framework::{goal_enum, Goal, Job};
///
/// goal_enum! {
///     pub enum SensorGoal {
///         Read,
///         Calibrate,
///         StoreSample,
///     }
/// }
///
/// assert_eq!(SensorGoal::StoreSample.name(), "store_sample");
/// let job = Job::new(SensorGoal::Read, "tester");
/// assert_eq!(job.goal(), &Goal::new("read"));
/// ```
#[macro_export]
macro_rules! goal_enum {
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $crate::__private::paste! { stringify!([<$variant:snake>]) }),+
                }
            }
        }

        impl ::core::convert::From<$name> for $crate::Goal {
            fn from(goal: $name) -> Self {
                $crate::Goal::from_static(goal.name())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    goal_enum! {
        enum TestGoal {
            Read,
            WriteBack,
        }
    }

    #[test]
    fn defaults() {
        let job = Job::new("Read", "sensor-1");
        assert_eq!(job.goal().as_str(), "read");
        assert_eq!(job.producer(), "sensor-1");
        assert_eq!(job.priority(), DEFAULT_PRIORITY);
        assert!(job.data().is_none());
        assert!(job.target().is_none());
        assert!(job.subscription().is_none());
    }

    #[test]
    fn builder_sets_fields() {
        let job = Job::new("read", "sensor-1")
            .with_data(json!({ "channel": 3 }))
            .with_target("logger")
            .with_priority(7);
        assert_eq!(job.data(), Some(&json!({ "channel": 3 })));
        assert_eq!(job.target(), Some(&ModuleType::new("logger")));
        assert_eq!(job.priority(), 7);
    }

    #[test]
    fn ordering_uses_priority_only() {
        let a = Job::new("read", "a").with_priority(2);
        let b = Job::new("store", "b").with_priority(2);
        let c = Job::new("read", "c").with_priority(1);
        assert_eq!(a, b);
        assert!(c < a);
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn goal_enum_names() {
        assert_eq!(TestGoal::Read.name(), "read");
        assert_eq!(TestGoal::WriteBack.name(), "write_back");
        assert_eq!(TestGoal::ALL.len(), 2);
        assert_eq!(Goal::from(TestGoal::WriteBack), Goal::new("write_back"));
    }

    #[test]
    fn goal_serializes_lowercase() {
        let goal: Goal = serde_json::from_str("\"READ\"").unwrap();
        assert_eq!(goal.as_str(), "read");
        assert_eq!(serde_json::to_string(&goal).unwrap(), "\"read\"");
    }

    #[test]
    fn subscription_is_carried_not_called() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let job = Job::new("read", "sensor-1").with_subscription(Subscription::new(move |_| {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        }));

        let moved = job.clone();
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);

        moved.subscription().unwrap().notify(&moved);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }
}
