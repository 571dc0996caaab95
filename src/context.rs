//! The `Context` owns every piece of simulation state and the queue of work
//! still to be done.
//!
//! Modules keep their state in *data plugins*: a plugin is a marker type that
//! names a data container, and the container is created lazily the first time
//! it is requested mutably. Everything the simulation reads or writes on a given
//! day (random streams, counters, locations, people, measures) is reached
//! through the context, so a snapshot of the context fully determines what
//! happens next.
use std::any::{Any, TypeId};
use std::collections::VecDeque;

use log::{error, trace};

use crate::error::FacsError;
use crate::hashing::{HashMap, HashMapExt};
use crate::plan::{ExecutionPhase, PlanId, Queue};

pub trait DataPlugin: Any {
    type DataContainer;

    fn create_data_container() -> Self::DataContainer;
}

/// Defines a data plugin marker type and the default value of its container.
#[macro_export]
macro_rules! define_data_plugin {
    ($plugin:ident, $data_container:ty, $default: expr) => {
        #[derive(Copy, Clone)]
        struct $plugin;

        impl $crate::context::DataPlugin for $plugin {
            type DataContainer = $data_container;

            fn create_data_container() -> Self::DataContainer {
                $default
            }
        }
    };
}
pub use define_data_plugin;

type Callback = dyn FnOnce(&mut Context);

pub struct Context {
    plan_queue: Queue<Box<Callback>>,
    callback_queue: VecDeque<Box<Callback>>,
    data_plugins: HashMap<TypeId, Box<dyn Any>>,
    current_time: f64,
    rank: usize,
    shutdown_requested: bool,
    fatal_error: Option<FacsError>,
}

impl Context {
    #[must_use]
    pub fn new() -> Context {
        Context {
            plan_queue: Queue::new(),
            callback_queue: VecDeque::new(),
            data_plugins: HashMap::new(),
            current_time: 0.0,
            rank: 0,
            shutdown_requested: false,
            fatal_error: None,
        }
    }

    /// Schedules `callback` to run at `time` in the `Normal` phase.
    ///
    /// # Panics
    ///
    /// Panics if `time` is not finite or lies in the past.
    pub fn add_plan(&mut self, time: f64, callback: impl FnOnce(&mut Context) + 'static) -> PlanId {
        self.add_plan_with_phase(time, callback, ExecutionPhase::Normal)
    }

    /// Schedules `callback` to run at `time`. Plans at the same time run in
    /// phase order, then in the order they were added.
    ///
    /// # Panics
    ///
    /// Panics if `time` is not finite or lies in the past.
    pub fn add_plan_with_phase(
        &mut self,
        time: f64,
        callback: impl FnOnce(&mut Context) + 'static,
        phase: ExecutionPhase,
    ) -> PlanId {
        assert!(
            time.is_finite() && time >= self.current_time,
            "Invalid time value {time}"
        );
        self.plan_queue.add_plan(time, Box::new(callback), phase)
    }

    pub fn cancel_plan(&mut self, id: &PlanId) {
        trace!("cancelling plan {id:?}");
        self.plan_queue.cancel_plan(id);
    }

    /// Runs `callback` before the next plan.
    pub fn queue_callback(&mut self, callback: impl FnOnce(&mut Context) + 'static) {
        self.callback_queue.push_back(Box::new(callback));
    }

    pub fn get_data_container_mut<T: DataPlugin>(&mut self, _plugin: T) -> &mut T::DataContainer {
        self.data_plugins
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::create_data_container()))
            .downcast_mut::<T::DataContainer>()
            .expect("data plugin container has the wrong type")
    }

    #[must_use]
    pub fn get_data_container<T: DataPlugin>(&self, _plugin: T) -> Option<&T::DataContainer> {
        self.data_plugins
            .get(&TypeId::of::<T>())
            .and_then(|container| container.downcast_ref::<T::DataContainer>())
    }

    #[must_use]
    pub fn get_current_time(&self) -> f64 {
        self.current_time
    }

    /// The partition this context simulates. Attached to every logged event.
    #[must_use]
    pub fn get_rank(&self) -> usize {
        self.rank
    }

    pub fn set_rank(&mut self, rank: usize) {
        self.rank = rank;
    }

    /// Stops execution after the current callback. Pending plans are dropped.
    pub fn shutdown(&mut self) {
        trace!("shutdown requested at t={}", self.current_time);
        self.shutdown_requested = true;
    }

    /// Stops execution after the current callback and makes `execute` return
    /// `error`. Only the first fatal error is kept.
    pub fn abort(&mut self, error: FacsError) {
        error!("aborting run at t={}: {error}", self.current_time);
        if self.fatal_error.is_none() {
            self.fatal_error = Some(error);
        }
        self.shutdown();
    }

    /// Runs callbacks and plans until the queue is empty, `shutdown` is
    /// called, or a callback aborts the run.
    ///
    /// # Errors
    ///
    /// Returns the error passed to `abort`, if any.
    pub fn execute(&mut self) -> Result<(), FacsError> {
        loop {
            if self.shutdown_requested {
                self.shutdown_requested = false;
                self.callback_queue.clear();
                self.plan_queue.clear();
                break;
            }

            // If there is a callback, run it.
            if let Some(callback) = self.callback_queue.pop_front() {
                callback(self);
                continue;
            }

            // There aren't any callbacks, so look at the first plan.
            if let Some(plan) = self.plan_queue.get_next_plan() {
                self.current_time = plan.time;
                (plan.data)(self);
            } else {
                break;
            }
        }

        match self.fatal_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
