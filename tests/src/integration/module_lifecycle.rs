//! # Module Lifecycle
//!
//! Simulated application modules that live on the bus:
//!
//! - each module announces `module.initialized` when it comes up and
//!   exposes its functions as call topics `module.<name>.<function>`
//! - function calls announce `module.function.called`, calculations
//!   announce `module.calculation.complete`, and resets announce
//!   `module.reset`
//! - a monitor subscribes to all lifecycle topics and keeps an ordered log
//!
//! Handlers are bound to their module instance so that two modules can share
//! handler code while keeping separate state.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{json, Value};
use smsg_bus::{
    BoundContext, BroadcastHandler, Bus, BusError, CallHandler, HandlerResult, SyncReply,
};

pub const INITIALIZED: &str = "module.initialized";
pub const FUNCTION_CALLED: &str = "module.function.called";
pub const CALCULATION_COMPLETE: &str = "module.calculation.complete";
pub const RESET: &str = "module.reset";

pub const LIFECYCLE_TOPICS: [&str; 4] = [INITIALIZED, FUNCTION_CALLED, CALCULATION_COMPLETE, RESET];

/// A module holding an accumulator, driven through call topics.
///
/// The bus keeps the module alive through its bound handlers, so the module
/// only holds a weak reference back to the bus.
pub struct SimulatedModule {
    pub name: String,
    bus: Weak<Bus>,
    total: Mutex<i64>,
}

impl SimulatedModule {
    /// Create the module, register its functions and announce it.
    pub fn load(bus: &Arc<Bus>, name: &str) -> Result<Arc<Self>, BusError> {
        let module = Arc::new(Self {
            name: name.to_string(),
            bus: Arc::downgrade(bus),
            total: Mutex::new(0),
        });
        let context = BoundContext::new(Arc::clone(&module));

        bus.try_register_with(
            &module.topic("add"),
            CallHandler::bound(Self::add),
            context.clone(),
        )?;
        bus.try_register_with(
            &module.topic("total"),
            CallHandler::bound(Self::total),
            context.clone(),
        )?;
        bus.try_register_with(&module.topic("reset"), CallHandler::bound(Self::reset), context)?;

        bus.publish(INITIALIZED, json!({ "module": module.name }))?;
        Ok(module)
    }

    /// Remove every call topic this module registered. Nothing to do once
    /// the bus itself is gone.
    pub fn unload(&self) -> Result<(), BusError> {
        let Some(bus) = self.bus.upgrade() else {
            return Ok(());
        };
        for function in ["add", "total", "reset"] {
            bus.unregister(&self.topic(function))?;
        }
        Ok(())
    }

    fn bus(&self) -> HandlerResult<Arc<Bus>> {
        self.bus
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("module '{}' outlived its bus", self.name))
    }

    pub fn topic(&self, function: &str) -> String {
        format!("module.{}.{}", self.name, function)
    }

    fn announce_call(&self, function: &str) -> HandlerResult {
        self.bus()?.publish(
            FUNCTION_CALLED,
            json!({ "module": self.name, "function": function }),
        )?;
        Ok(())
    }

    fn add(&self, data: Value) -> HandlerResult<Value> {
        self.announce_call("add")?;
        let amount = data["amount"]
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("add expects an integer 'amount'"))?;

        let total = {
            let mut total = self.total.lock();
            *total += amount;
            *total
        };

        self.bus()?.publish(
            CALCULATION_COMPLETE,
            json!({ "module": self.name, "result": total }),
        )?;
        Ok(json!(total))
    }

    fn total(&self, _data: Value) -> HandlerResult<Value> {
        self.announce_call("total")?;
        Ok(json!(*self.total.lock()))
    }

    fn reset(&self, _data: Value) -> HandlerResult<Value> {
        self.announce_call("reset")?;
        *self.total.lock() = 0;
        self.bus()?.publish(RESET, json!({ "module": self.name }))?;
        Ok(Value::Null)
    }
}

/// Ordered log of lifecycle events.
#[derive(Default)]
pub struct LifecycleMonitor {
    events: Mutex<Vec<(String, Value)>>,
}

impl LifecycleMonitor {
    /// Subscribe a new monitor to every lifecycle topic.
    pub fn attach(bus: &Bus) -> Result<Arc<Self>, BusError> {
        let monitor = Arc::new(Self::default());
        for topic in LIFECYCLE_TOPICS {
            let recorded_topic = topic.to_string();
            bus.subscribe_with(
                topic,
                BroadcastHandler::bound(move |monitor: &LifecycleMonitor, data| {
                    monitor
                        .events
                        .lock()
                        .push((recorded_topic.clone(), data.clone()));
                    Ok(())
                }),
                BoundContext::new(Arc::clone(&monitor)),
            )?;
        }
        Ok(monitor)
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.events.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Events on `topic` whose `module` field is `module`.
    pub fn for_module(&self, topic: &str, module: &str) -> Vec<Value> {
        self.events
            .lock()
            .iter()
            .filter(|(t, data)| t == topic && data["module"] == module)
            .map(|(_, data)| data.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_announces_and_registers() {
        let bus = Arc::new(Bus::new());
        let monitor = LifecycleMonitor::attach(&bus).unwrap();

        let module = SimulatedModule::load(&bus, "calc").unwrap();

        assert_eq!(monitor.topics(), vec![INITIALIZED]);
        assert_eq!(monitor.events()[0].1, json!({ "module": "calc" }));
        for function in ["add", "total", "reset"] {
            assert!(bus.check(&module.topic(function)).unwrap().has_call_handler);
        }
    }

    #[test]
    fn test_calculation_flow() {
        let bus = Arc::new(Bus::new());
        let monitor = LifecycleMonitor::attach(&bus).unwrap();
        let module = SimulatedModule::load(&bus, "calc").unwrap();

        let add = module.topic("add");
        assert_eq!(
            bus.invoke_sync(&add, json!({"amount": 40})).unwrap(),
            Some(SyncReply::Value(json!(40)))
        );
        assert_eq!(
            bus.invoke_sync(&add, json!({"amount": 2})).unwrap(),
            Some(SyncReply::Value(json!(42)))
        );

        assert_eq!(
            monitor.topics(),
            vec![
                INITIALIZED,
                FUNCTION_CALLED,
                CALCULATION_COMPLETE,
                FUNCTION_CALLED,
                CALCULATION_COMPLETE,
            ]
        );
        assert_eq!(
            monitor.for_module(CALCULATION_COMPLETE, "calc"),
            vec![
                json!({ "module": "calc", "result": 40 }),
                json!({ "module": "calc", "result": 42 }),
            ]
        );
    }

    #[test]
    fn test_reset_flow() {
        let bus = Arc::new(Bus::new());
        let monitor = LifecycleMonitor::attach(&bus).unwrap();
        let module = SimulatedModule::load(&bus, "calc").unwrap();

        bus.invoke_sync(&module.topic("add"), json!({"amount": 5}))
            .unwrap();
        bus.invoke_sync(&module.topic("reset"), json!(null))
            .unwrap();

        assert_eq!(
            bus.invoke_sync(&module.topic("total"), json!(null)).unwrap(),
            Some(SyncReply::Value(json!(0)))
        );
        assert_eq!(monitor.for_module(RESET, "calc").len(), 1);
    }

    #[test]
    fn test_modules_keep_separate_state() {
        let bus = Arc::new(Bus::new());
        let monitor = LifecycleMonitor::attach(&bus).unwrap();
        let left = SimulatedModule::load(&bus, "left").unwrap();
        let right = SimulatedModule::load(&bus, "right").unwrap();

        bus.invoke_sync(&left.topic("add"), json!({"amount": 1}))
            .unwrap();
        bus.invoke_sync(&right.topic("add"), json!({"amount": 10}))
            .unwrap();
        bus.invoke_sync(&right.topic("add"), json!({"amount": 10}))
            .unwrap();

        assert_eq!(
            bus.invoke_sync(&left.topic("total"), json!(null)).unwrap(),
            Some(SyncReply::Value(json!(1)))
        );
        assert_eq!(
            bus.invoke_sync(&right.topic("total"), json!(null)).unwrap(),
            Some(SyncReply::Value(json!(20)))
        );
        assert_eq!(monitor.for_module(INITIALIZED, "left").len(), 1);
        assert_eq!(monitor.for_module(INITIALIZED, "right").len(), 1);
    }

    #[test]
    fn test_loading_same_name_twice_fails() {
        let bus = Arc::new(Bus::new());
        let _first = SimulatedModule::load(&bus, "calc").unwrap();

        let err = SimulatedModule::load(&bus, "calc").err().unwrap();
        assert!(matches!(err, BusError::DuplicateRegistration { .. }));
    }

    #[test]
    fn test_bad_input_fails_without_announcing_result() {
        let bus = Arc::new(Bus::new());
        let monitor = LifecycleMonitor::attach(&bus).unwrap();
        let module = SimulatedModule::load(&bus, "calc").unwrap();

        let err = bus
            .invoke_sync(&module.topic("add"), json!({"amount": "lots"}))
            .unwrap_err();

        assert!(err.to_string().contains("integer 'amount'"));
        assert!(monitor.for_module(CALCULATION_COMPLETE, "calc").is_empty());
        assert_eq!(monitor.for_module(FUNCTION_CALLED, "calc").len(), 1);
    }

    #[test]
    fn test_unload_removes_call_topics() {
        let bus = Arc::new(Bus::new());
        let module = SimulatedModule::load(&bus, "calc").unwrap();
        module.unload().unwrap();

        assert_eq!(bus.invoke_sync(&module.topic("total"), json!(null)).unwrap(), None);
        assert!(bus.topics().is_empty());
    }

    #[test]
    fn test_dropping_bus_releases_loaded_module() {
        let bus = Arc::new(Bus::new());
        let module = SimulatedModule::load(&bus, "calc").unwrap();
        let module_ref = Arc::downgrade(&module);
        let bus_ref = Arc::downgrade(&bus);

        drop(module);
        assert!(module_ref.upgrade().is_some());

        drop(bus);
        assert!(bus_ref.upgrade().is_none());
        assert!(module_ref.upgrade().is_none());
    }

    #[test]
    fn test_unload_after_bus_dropped_is_noop() {
        let bus = Arc::new(Bus::new());
        let module = SimulatedModule::load(&bus, "calc").unwrap();
        drop(bus);

        module.unload().unwrap();
        let err = module.total(json!(null)).unwrap_err();
        assert!(err.to_string().contains("outlived its bus"));
    }

    #[tokio::test]
    async fn test_deferred_calls_announce_after_invoke_returns() {
        let bus = Arc::new(Bus::new());
        let monitor = LifecycleMonitor::attach(&bus).unwrap();
        let module = SimulatedModule::load(&bus, "calc").unwrap();

        let pending = bus
            .invoke(&module.topic("add"), json!({"amount": 7}))
            .unwrap();
        assert!(monitor.for_module(FUNCTION_CALLED, "calc").is_empty());

        assert_eq!(pending.await.unwrap(), Some(json!(7)));
        assert_eq!(monitor.for_module(CALCULATION_COMPLETE, "calc").len(), 1);
    }
}
