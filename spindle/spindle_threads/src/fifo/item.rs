//! Work items whose readiness depends on other items.
//!
//! An [`ItemWithPredicate`] holds weak references to the items it depends
//! on. A dependency is satisfied once its item has been processed *and*
//! its strong reference dropped by the consumer; the weak reference then
//! expires. When every dependency has expired the item reports itself
//! ready and latches into the processing state.

use parking_lot::Mutex as RawMutex;
use spindle_core::{Error, Result};
use std::sync::{Arc, Weak};

use super::ValidWorkload;

type Dependency = Weak<dyn ValidWorkload + Send + Sync>;

/// Dependency list and processing latch, under one lock.
struct ItemState {
    dependencies: Vec<Dependency>,
    processing: bool,
}

/// A queue item gated by the completion of other items.
///
/// Embed one in a work item type and delegate [`ValidWorkload`] to it:
///
/// ```
/// use std::sync::Arc;
/// use spindle_threads::fifo::{Fifo, ItemWithPredicate, ValidWorkload};
///
/// struct Step {
///     predicate: ItemWithPredicate,
///     label: &'static str,
/// }
///
/// impl ValidWorkload for Step {
///     fn valid_workload(&self) -> bool {
///         self.predicate.valid_workload()
///     }
/// }
///
/// let fifo = Fifo::<Arc<Step>>::for_workloads();
/// let first = Arc::new(Step { predicate: ItemWithPredicate::new(), label: "first" });
/// let second = Arc::new(Step { predicate: ItemWithPredicate::new(), label: "second" });
/// second.predicate.add_dependency(&first).unwrap();
/// fifo.push_back(Arc::clone(&second));
/// fifo.push_back(Arc::clone(&first));
///
/// // "second" waits for "first" to be processed and released
/// assert_eq!(fifo.pop_front(0).map(|step| step.label), Some("first"));
/// ```
///
/// Consumers must drop their strong reference to a finished item at the
/// intended release point; holding on to it keeps every dependent item
/// blocked.
pub struct ItemWithPredicate {
    state: RawMutex<ItemState>,
}

impl ItemWithPredicate {
    /// Create an item with no dependencies.
    pub fn new() -> Self {
        Self {
            state: RawMutex::new(ItemState {
                dependencies: Vec::new(),
                processing: false,
            }),
        }
    }

    /// Create an item depending on `dependency`.
    pub fn with_dependency<D>(dependency: &Arc<D>) -> Self
    where
        D: ValidWorkload + Send + Sync + 'static,
    {
        let item = Self::new();
        item.state.lock().dependencies.push(downgrade(dependency));
        item
    }

    /// Create an item depending on every entry of `dependencies`.
    pub fn with_dependencies<D>(dependencies: &[Arc<D>]) -> Self
    where
        D: ValidWorkload + Send + Sync + 'static,
    {
        let item = Self::new();
        item.state
            .lock()
            .dependencies
            .extend(dependencies.iter().map(downgrade));
        item
    }

    /// Add one dependency.
    ///
    /// Fails with [`Error::InUse`] once the item reported itself ready:
    /// processing may already have started and cannot be taken back.
    pub fn add_dependency<D>(&self, dependency: &Arc<D>) -> Result<()>
    where
        D: ValidWorkload + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        if state.processing {
            return Err(Error::in_use(
                "workload is already being processed, dependencies can no longer be added",
            ));
        }
        state.dependencies.push(downgrade(dependency));
        Ok(())
    }

    /// Add a batch of dependencies.
    ///
    /// Fails with [`Error::InUse`] once the item reported itself ready.
    pub fn add_dependencies<D>(&self, dependencies: &[Arc<D>]) -> Result<()>
    where
        D: ValidWorkload + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        if state.processing {
            return Err(Error::in_use(
                "workload is already being processed, dependencies can no longer be added",
            ));
        }
        state.dependencies.extend(dependencies.iter().map(downgrade));
        Ok(())
    }

    /// Whether this item started processing.
    pub fn is_processing(&self) -> bool {
        self.state.lock().processing
    }
}

fn downgrade<D>(dependency: &Arc<D>) -> Dependency
where
    D: ValidWorkload + Send + Sync + 'static,
{
    let strong: Arc<dyn ValidWorkload + Send + Sync> = dependency.clone();
    Arc::downgrade(&strong)
}

impl ValidWorkload for ItemWithPredicate {
    /// Ready when every dependency has been released.
    ///
    /// Expired dependencies are pruned on each query. The first `true`
    /// answer latches the item into the processing state; from then on
    /// the answer stays `true` and the dependency list is frozen.
    fn valid_workload(&self) -> bool {
        let mut state = self.state.lock();

        state
            .dependencies
            .retain(|dependency| dependency.strong_count() != 0);

        if state.dependencies.is_empty() {
            state.processing = true;
            return true;
        }

        false
    }
}

impl Default for ItemWithPredicate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ItemWithPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ItemWithPredicate")
            .field("dependencies", &state.dependencies.len())
            .field("processing", &state.processing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fifo::Fifo;

    struct WorkItem {
        predicate: ItemWithPredicate,
        data: usize,
    }

    impl WorkItem {
        fn new(data: usize) -> Arc<Self> {
            Arc::new(Self {
                predicate: ItemWithPredicate::new(),
                data,
            })
        }
    }

    impl ValidWorkload for WorkItem {
        fn valid_workload(&self) -> bool {
            self.predicate.valid_workload()
        }
    }

    #[test]
    fn test_no_dependencies_is_ready() {
        let item = ItemWithPredicate::new();
        assert!(!item.is_processing());
        assert!(item.valid_workload());
        assert!(item.is_processing());
    }

    #[test]
    fn test_ready_answer_is_permanent() {
        let item = ItemWithPredicate::new();
        assert!(item.valid_workload());
        assert!(item.valid_workload());
        assert!(item.valid_workload());
    }

    #[test]
    fn test_dependency_blocks_until_released() {
        let blocker = WorkItem::new(1);
        let item = ItemWithPredicate::with_dependency(&blocker);

        assert!(!item.valid_workload());

        drop(blocker);
        assert!(item.valid_workload());
    }

    #[test]
    fn test_no_new_dependencies_once_processing() {
        let other = WorkItem::new(1);
        let item = ItemWithPredicate::new();

        assert!(item.valid_workload());

        let result = item.add_dependency(&other);
        assert!(matches!(result, Err(Error::InUse(_))));

        let result = item.add_dependencies(&[other]);
        assert!(matches!(result, Err(Error::InUse(_))));
    }

    #[test]
    fn test_chain_pops_in_insertion_order() {
        let fifo = Fifo::<Arc<WorkItem>>::for_workloads();

        let items: Vec<Arc<WorkItem>> = (1..=10).map(WorkItem::new).collect();
        for item in &items {
            fifo.push_back(Arc::clone(item));
        }

        items[1].predicate.add_dependency(&items[0]).unwrap();
        items[2].predicate.add_dependency(&items[1]).unwrap();
        items[3].predicate.add_dependency(&items[0]).unwrap();
        items[4].predicate.add_dependencies(&items[0..4]).unwrap();
        items[5]
            .predicate
            .add_dependencies(&[Arc::clone(&items[3]), Arc::clone(&items[4])])
            .unwrap();
        items[6].predicate.add_dependency(&items[2]).unwrap();
        items[7].predicate.add_dependency(&items[6]).unwrap();
        items[8].predicate.add_dependency(&items[6]).unwrap();
        items[9]
            .predicate
            .add_dependencies(&[Arc::clone(&items[7]), Arc::clone(&items[6])])
            .unwrap();

        drop(items);

        for expected in 1..=10 {
            let item = fifo.pop_front(0).expect("an item should be ready");
            assert_eq!(item.data, expected);
        }
        assert!(fifo.is_empty());
    }

    #[test]
    fn test_dependency_graph_pops_first_ready() {
        let fifo = Fifo::<Arc<WorkItem>>::for_workloads();

        let items: Vec<Arc<WorkItem>> = (1..=10).map(WorkItem::new).collect();
        for item in &items {
            fifo.push_back(Arc::clone(item));
        }

        items[0].predicate.add_dependency(&items[5]).unwrap();
        items[1]
            .predicate
            .add_dependencies(&[Arc::clone(&items[0]), Arc::clone(&items[3])])
            .unwrap();
        items[2].predicate.add_dependency(&items[7]).unwrap();
        items[3]
            .predicate
            .add_dependencies(&[Arc::clone(&items[8]), Arc::clone(&items[9])])
            .unwrap();
        items[4]
            .predicate
            .add_dependencies(&[Arc::clone(&items[6]), Arc::clone(&items[0])])
            .unwrap();
        items[6].predicate.add_dependency(&items[2]).unwrap();
        items[7].predicate.add_dependency(&items[5]).unwrap();
        items[8].predicate.add_dependency(&items[5]).unwrap();
        items[9]
            .predicate
            .add_dependencies(&[Arc::clone(&items[8]), Arc::clone(&items[4])])
            .unwrap();

        drop(items);

        {
            let item = fifo.pop_front(0).expect("item 6 has no dependency");
            assert_eq!(item.data, 6);

            // while item 6 is still referenced, nothing else is ready
            assert!(fifo.pop_front(0).is_none());
        }

        // releasing each popped item unblocks the next in this order
        for expected in [1, 8, 3, 7, 5, 9, 10, 4, 2] {
            let item = fifo.pop_front(0).expect("an item should be ready");
            assert_eq!(item.data, expected);
        }
        assert!(fifo.is_empty());
    }
}
