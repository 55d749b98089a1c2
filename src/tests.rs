use core::cell::RefCell;
use core::time::Duration;
use std::rc::Rc;

use undertow_core::{Cleanup, Component, Error, Lanes, Node, Resource, RootMode, SetState, deps, host, suspense};

use crate::testing::Harness;

type Slot<T> = Rc<RefCell<Option<SetState<T>>>>;

fn setter<T: 'static>(slot: &Slot<T>) -> SetState<T> {
    slot.borrow().clone().expect("component mounted")
}

/// A `<p>` showing a string state above a long list, so that concurrent
/// renders of it take many units of work.
fn journal(slot: &Slot<String>) -> Component {
    let slot = slot.clone();
    Component::new("Journal", move |cx, _props| {
        let (entries, set) = cx.use_state(|| String::from("-"))?;
        *slot.borrow_mut() = Some(set);
        let rows = (0_u64..30).map(|row| host("li").key(row).child(row.to_string()));
        Ok(host("div")
            .child(host("p").child(entries))
            .child(host("ul").children(rows))
            .into())
    })
}

fn paragraph(harness: &Harness) -> String {
    let p = harness.host().find_by_tag("p")[0];
    harness.host().inner_html(p)
}

fn append(slot: &Slot<String>, suffix: &'static str) {
    setter(slot).update(move |entries| format!("{entries}{suffix}"));
}

#[test]
fn sync_update_interrupting_a_render_keeps_enqueue_order() {
    let harness = Harness::new();
    let slot = Slot::default();
    harness.act(|| harness.render(journal(&slot).element()));
    assert_eq!(paragraph(&harness), "-");

    harness.set_work_duration(Duration::from_millis(1));
    append(&slot, "a");
    assert!(harness.run_slice());
    assert_eq!(paragraph(&harness), "-", "the default render yielded before committing");
    assert!(harness.root().pending_lanes().contains(Lanes::DEFAULT));

    harness.discrete(|| append(&slot, "b"));
    assert_eq!(paragraph(&harness), "-b");
    assert_eq!(harness.root().last_commit().expect("committed").lane, Lanes::SYNC);

    harness.flush();
    assert_eq!(paragraph(&harness), "-ab");
    assert_eq!(harness.root().last_commit().expect("committed").lane, Lanes::DEFAULT);
    assert!(harness.root().pending_lanes().is_empty());
}

#[test]
fn transition_renders_after_default_work() {
    let harness = Harness::new();
    let slot = Slot::default();
    harness.act(|| harness.render(journal(&slot).element()));

    harness.root().start_transition(|| append(&slot, "a"));
    append(&slot, "b");
    assert!(harness.root().pending_lanes().contains(Lanes::TRANSITION | Lanes::DEFAULT));

    assert!(harness.run_slice());
    assert_eq!(paragraph(&harness), "-b");
    harness.flush();
    assert_eq!(paragraph(&harness), "-ab");
    assert_eq!(harness.root().last_commit().expect("committed").lane, Lanes::TRANSITION);
}

#[test]
fn expired_render_finishes_in_one_slice() {
    let harness = Harness::new();
    let slot = Slot::default();
    harness.act(|| harness.render(journal(&slot).element()));

    harness.set_work_duration(Duration::from_millis(1));
    append(&slot, "late");
    harness.advance(Duration::from_secs(6));
    assert!(harness.run_slice());
    assert_eq!(paragraph(&harness), "-late");
    assert!(!harness.scheduler().has_pending());
}

#[test]
fn dispatched_click_commits_without_the_scheduler() {
    let harness = Harness::new();
    let counter = Component::new("Counter", |cx, _props| {
        let (count, set) = cx.use_state(|| 0_u32)?;
        Ok(host("button")
            .on("click", move || set.update(|count| count + 1))
            .child(count.to_string())
            .into())
    });
    harness.act(|| harness.render(counter.element()));
    let button = harness.host().find_by_tag("button")[0];

    assert!(harness.dispatch(button, "click"));
    assert_eq!(harness.html(), "<button>1</button>");
    assert!(!harness.scheduler().has_pending());
}

#[test]
fn suspense_round_trip_through_the_memory_host() {
    let harness = Harness::new();
    let (resource, resolver) = Resource::<String>::pending();
    let reader = Component::new("Reader", move |_cx, _props| {
        let value = resource.read()?;
        Ok(host("article").child(value.as_str()).into())
    });
    harness.act(|| harness.render(suspense("loading").child(reader.element())));
    assert_eq!(harness.html(), "loading");
    harness.take_ops();

    resolver.resolve("ready".to_owned());
    harness.flush();
    assert_eq!(harness.html(), "<article>ready</article>");
    let stats = harness.root().last_commit().expect("committed");
    assert!(stats.deletions >= 1, "{stats:?}");
}

#[test]
fn effects_follow_the_commit_and_clean_up_on_unmount() {
    let harness = Harness::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let slot: Slot<u32> = Slot::default();

    let effect_log = log.clone();
    let effect_slot = slot.clone();
    let watcher = Component::new("Watcher", move |cx, _props| {
        let (value, set) = cx.use_state(|| 1_u32)?;
        *effect_slot.borrow_mut() = Some(set);
        let log = effect_log.clone();
        cx.use_effect(Some(deps![value]), move || {
            log.borrow_mut().push(format!("create {value}"));
            let log = log.clone();
            Cleanup::new(move || log.borrow_mut().push(format!("destroy {value}")))
        })?;
        Ok(Node::from(value.to_string()))
    });

    harness.render(watcher.element());
    harness.flush_microtasks();
    assert_eq!(harness.html(), "1");
    assert!(log.borrow().is_empty(), "passive effects wait for their task");

    harness.flush();
    assert_eq!(*log.borrow(), vec!["create 1"]);

    harness.act(|| setter(&slot).set(2));
    harness.act(|| setter(&slot).set(2));
    assert_eq!(*log.borrow(), vec!["create 1", "destroy 1", "create 2"]);

    harness.root().unmount();
    assert_eq!(harness.html(), "");
    assert_eq!(log.borrow().last().map(String::as_str), Some("destroy 2"));
}

#[test]
fn legacy_root_commits_every_update_synchronously() {
    let harness = Harness::builder().mode(RootMode::Legacy).label("legacy").build();
    let slot = Slot::default();
    harness.act(|| harness.render(journal(&slot).element()));

    append(&slot, "x");
    harness.flush_microtasks();
    assert_eq!(paragraph(&harness), "-x");
    assert!(!harness.scheduler().has_pending());
}

#[test]
fn component_failure_keeps_the_committed_tree() {
    let harness = Harness::new();
    let slot: Slot<bool> = Slot::default();
    let app_slot = slot.clone();
    let app = Component::new("Fragile", move |cx, _props| {
        let (broken, set) = cx.use_state(|| false)?;
        *app_slot.borrow_mut() = Some(set);
        if broken {
            return Err(cx.fail("broken on purpose"));
        }
        Ok(host("p").child("fine").into())
    });
    harness.act(|| harness.render(app.element()));

    harness.act(|| setter(&slot).set(true));
    assert_eq!(harness.html(), "<p>fine</p>");
    assert!(matches!(
        harness.root().take_error(),
        Some(Error::Component { message, .. }) if message == "broken on purpose"
    ));
    assert!(harness.root().take_error().is_none());
}
