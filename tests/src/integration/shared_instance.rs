//! # Shared Instance
//!
//! Every part of a process reaches the same bus through [`smsg_bus::bus`].
//! These tests run against that instance, so each one uses topics under its
//! own `shared.<test>.` prefix and never clears the registry.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::json;
    use smsg_bus::{bus, BroadcastHandler, Bus, CallHandler, SyncReply};

    #[test]
    fn test_every_accessor_returns_same_bus() {
        assert!(std::ptr::eq(bus(), Bus::instance()));
        assert!(std::ptr::eq(bus(), bus()));
    }

    #[test]
    fn test_subscription_visible_through_any_accessor() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let handler = BroadcastHandler::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus().subscribe("shared.visibility.evt", handler.clone()).unwrap();
        Bus::instance()
            .publish("shared.visibility.evt", json!(1))
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        Bus::instance()
            .unsubscribe("shared.visibility.evt", &handler)
            .unwrap();
        assert_eq!(bus().check("shared.visibility.evt").unwrap().subscriber_count, 0);
    }

    #[test]
    fn test_registration_visible_from_another_thread() {
        bus()
            .register("shared.threads.echo", CallHandler::new(Ok))
            .unwrap();

        let reply = std::thread::spawn(|| bus().invoke_sync("shared.threads.echo", json!("hi")))
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(reply, Some(SyncReply::Value(json!("hi"))));

        bus().unregister("shared.threads.echo").unwrap();
    }

    #[tokio::test]
    async fn test_invoke_on_shared_bus() {
        bus()
            .register("shared.invoke.answer", CallHandler::new(|_| Ok(json!(42))))
            .unwrap();

        let reply = bus()
            .invoke("shared.invoke.answer", json!(null))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(reply, Some(json!(42)));

        bus().unregister("shared.invoke.answer").unwrap();
        assert!(!bus().check("shared.invoke.answer").unwrap().has_call_handler);
    }
}
