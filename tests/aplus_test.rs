#[cfg(test)]
mod adapter {
    use promise_plus::{Deferred, Promise, Reason, Scheduler};

    pub fn resolved<T: Clone + Send + 'static>(scheduler: &Scheduler, value: T) -> Promise<T> {
        Promise::resolved(scheduler, value)
    }

    pub fn rejected<T: Clone + Send + 'static>(
        scheduler: &Scheduler,
        reason: &'static str,
    ) -> Promise<T> {
        Promise::rejected(scheduler, Reason::new(reason))
    }

    pub fn deferred<T: Clone + Send + 'static>(scheduler: &Scheduler) -> Deferred<T> {
        Promise::deferred(scheduler)
    }
}

#[cfg(test)]
mod tests {
    use super::adapter::{deferred, rejected, resolved};
    use promise_plus::{
        AggregateError, Error, MicrotaskQueue, Promise, PromiseState, Reason, Resolution, Settled,
    };
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(vec![]));
        (log.clone(), log)
    }

    #[test]
    fn test_on_fulfilled_called_once_after_settlement() {
        let queue = MicrotaskQueue::new();
        let d = deferred::<i32>(&queue.scheduler());
        let (log, seen) = recorder();
        d.promise.map(move |v| log.lock().unwrap().push(format!("ok {v}")));
        d.resolver.fulfill(1);
        d.resolver.fulfill(2);
        d.resolver.reject(Reason::new("late"));
        assert!(seen.lock().unwrap().is_empty());
        queue.run_until_stalled();
        assert_eq!(*seen.lock().unwrap(), vec!["ok 1"]);
    }

    #[test]
    fn test_then_returns_before_handler_runs() {
        let queue = MicrotaskQueue::new();
        let (log, seen) = recorder();
        let promise = resolved(&queue.scheduler(), 1);
        let handler_log = log.clone();
        promise.map(move |_| handler_log.lock().unwrap().push("handler".into()));
        log.lock().unwrap().push("after then".into());
        queue.run_until_stalled();
        assert_eq!(*seen.lock().unwrap(), vec!["after then", "handler"]);
    }

    #[test]
    fn test_multiple_handlers_mixed_outcomes_keep_order() {
        let queue = MicrotaskQueue::new();
        let d = deferred::<i32>(&queue.scheduler());
        let (log, seen) = recorder();
        let (a, b, c) = (log.clone(), log.clone(), log);
        d.promise.catch(move |_| {
            a.lock().unwrap().push("first".into());
            Ok(Resolution::Value(0))
        });
        d.promise.then(
            |_| Ok(Resolution::Value(())),
            move |_| {
                b.lock().unwrap().push("second".into());
                Err(Reason::new("rethrown"))
            },
        );
        d.promise.catch(move |_| {
            c.lock().unwrap().push("third".into());
            Ok(Resolution::Value(0))
        });
        d.resolver.reject(Reason::new("boom"));
        queue.run_until_stalled();
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_reason_identity_is_preserved() {
        let queue = MicrotaskQueue::new();
        let reason = Reason::new(vec![1u8, 2, 3]);
        let promise = Promise::<i32>::rejected(&queue.scheduler(), reason.clone())
            .map(|v| v)
            .catch(|r| Err(r));
        queue.run_until_stalled();
        let observed = promise.outcome().and_then(Settled::reason).unwrap();
        assert!(Reason::ptr_eq(&reason, &observed));
    }

    #[test]
    fn test_flattening_is_idempotent() {
        let queue = MicrotaskQueue::new();
        let scheduler = queue.scheduler();
        let once = Promise::resolve_with(&scheduler, Resolution::Value(4));
        let twice =
            Promise::resolve_with(&scheduler, Promise::resolved(&scheduler, 4).into());
        queue.run_until_stalled();
        assert_eq!(once.outcome().and_then(Settled::value), Some(4));
        assert_eq!(twice.outcome().and_then(Settled::value), Some(4));
    }

    #[test]
    fn test_deeply_nested_pending_promises() {
        let queue = MicrotaskQueue::new();
        let scheduler = queue.scheduler();
        let innermost = deferred::<&'static str>(&scheduler);
        let mut current = innermost.promise.clone();
        for _ in 0..100 {
            let outer = deferred(&scheduler);
            outer.resolver.resolve(Resolution::Promise(current));
            current = outer.promise;
        }
        queue.run_until_stalled();
        assert_eq!(current.state(), PromiseState::Pending);
        innermost.resolver.fulfill("bottom");
        queue.run_until_stalled();
        assert_eq!(current.outcome().and_then(Settled::value), Some("bottom"));
    }

    #[test]
    fn test_self_returning_handler_is_a_cycle() {
        let queue = MicrotaskQueue::new();
        let slot: Arc<Mutex<Option<Promise<i32>>>> = Arc::new(Mutex::new(None));
        let inner = slot.clone();
        let promise = rejected::<i32>(&queue.scheduler(), "start").catch(move |_| {
            let me = inner.lock().unwrap().clone().unwrap();
            Ok(Resolution::Promise(me))
        });
        *slot.lock().unwrap() = Some(promise.clone());
        queue.run_until_stalled();
        let reason = promise.outcome().and_then(Settled::reason).unwrap();
        assert_eq!(reason.downcast_ref::<Error>(), Some(&Error::ChainCycle));
    }

    #[test]
    fn test_foreign_thenable_calls_both_callbacks() {
        let queue = MicrotaskQueue::new();
        let promise = resolved(&queue.scheduler(), ()).and_then(|_| {
            Ok(Resolution::from_then(|on_ok, on_err| {
                on_ok.fulfill(5);
                on_err.reject(Reason::new(6));
                Ok(())
            }))
        });
        queue.run_until_stalled();
        assert_eq!(promise.outcome().and_then(Settled::value), Some(5));
    }

    #[test]
    fn test_finally_passthrough() {
        let queue = MicrotaskQueue::new();
        let scheduler = queue.scheduler();
        let inner = scheduler.clone();
        let value = resolved(&scheduler, 1)
            .finally(move || Ok(Resolution::Promise(resolved(&inner, ()))))
            .and_then(|v| Ok(Resolution::Value(v)));
        let reason = rejected::<i32>(&scheduler, "x")
            .finally(|| Ok(Resolution::Value(())))
            .catch(|r| {
                let len = r.downcast_ref::<&str>().map_or(0, |s| s.len() as i32);
                Ok(Resolution::Value(len))
            });
        queue.run_until_stalled();
        assert_eq!(value.outcome().and_then(Settled::value), Some(1));
        assert_eq!(reason.outcome().and_then(Settled::value), Some(1));
    }

    /// Three inputs settle in order: fulfilled(1), fulfilled(2), rejected("e").
    #[test]
    fn test_combinators_over_staggered_inputs() {
        let queue = MicrotaskQueue::new();
        let scheduler = queue.scheduler();
        let inputs: Vec<_> = (0..3).map(|_| deferred::<i32>(&scheduler)).collect();
        let promises = || -> Vec<Resolution<i32>> {
            inputs.iter().map(|d| Resolution::Promise(d.promise.clone())).collect()
        };

        let race = Promise::race(&scheduler, promises());
        let all = Promise::all(&scheduler, promises());
        let settled = Promise::all_settled(&scheduler, promises());
        let any = Promise::any(&scheduler, promises());

        inputs[0].resolver.fulfill(1);
        queue.run_until_stalled();
        inputs[1].resolver.fulfill(2);
        queue.run_until_stalled();
        inputs[2].resolver.reject(Reason::new("e"));
        queue.run_until_stalled();

        assert_eq!(race.outcome().and_then(Settled::value), Some(1));
        assert_eq!(
            all.outcome().and_then(Settled::reason).map(|r| r.to_string()),
            Some(String::from("e"))
        );
        assert_eq!(any.outcome().and_then(Settled::value), Some(1));
        let outcomes = settled.outcome().and_then(Settled::value).unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].clone().value(), Some(1));
        assert_eq!(outcomes[1].clone().value(), Some(2));
        assert_eq!(outcomes[2].clone().reason().map(|r| r.to_string()), Some(String::from("e")));
    }

    #[test]
    fn test_any_all_rejected() {
        let queue = MicrotaskQueue::new();
        let scheduler = queue.scheduler();
        let any = Promise::<i32>::any(
            &scheduler,
            ["a", "b", "c"].map(|r| Resolution::Promise(rejected(&scheduler, r))),
        );
        queue.run_until_stalled();
        let reason = any.outcome().and_then(Settled::reason).unwrap();
        let reasons: Vec<String> = reason
            .downcast_ref::<AggregateError>()
            .unwrap()
            .reasons
            .iter()
            .map(|r| r.to_string())
            .collect();
        assert_eq!(reasons, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_settle_from_another_thread() {
        let queue = MicrotaskQueue::new();
        let d = deferred::<String>(&queue.scheduler());
        let upper = d.promise.map(|s| s.to_uppercase());
        let task1 = thread::spawn(move || d.resolver.fulfill(String::from("hi")));
        task1.join().expect("The task1 thread has panicked");
        queue.run_until_stalled();
        assert_eq!(upper.outcome().and_then(Settled::value), Some(String::from("HI")));
    }
}
