use std::rc::Rc;

use undertow_core::{Component, HostConfig, HostError, Node, PropValue, Root, host};
use undertow_scheduler::{CooperativeScheduler, ManualClock};

use crate::{HostOp, MemoryHost, NodeId};

struct Env {
    host: MemoryHost,
    scheduler: Rc<CooperativeScheduler<ManualClock>>,
    root: Root<MemoryHost>,
}

impl Env {
    fn new() -> Self {
        let host = MemoryHost::new();
        let scheduler = Rc::new(CooperativeScheduler::with_clock(ManualClock::new()));
        let root = Root::builder(host.clone(), host.container(), scheduler.clone()).build();
        Self { host, scheduler, root }
    }

    fn flush(&self) {
        loop {
            let ran = self.host.flush_microtasks();
            if !self.scheduler.run_next_task() && ran == 0 {
                break;
            }
        }
    }
}

fn list(keys: &[&str]) -> Node {
    host("ul")
        .children(keys.iter().map(|key| host("li").key(*key).child(*key)))
        .into()
}

fn moves(ops: &[HostOp]) -> Vec<&HostOp> {
    ops.iter()
        .filter(|op| matches!(op, HostOp::Append { .. } | HostOp::Insert { .. } | HostOp::Remove { .. }))
        .collect()
}

#[test]
fn first_render_waits_for_the_microtask() {
    let env = Env::new();
    env.root.render(list(&["a", "b"]));
    assert_eq!(env.host.render_to_string(), "");
    assert_eq!(env.host.pending_microtasks(), 1);

    env.host.flush_microtasks();
    assert_eq!(env.host.render_to_string(), "<ul><li>a</li><li>b</li></ul>");

    let ops = env.host.take_ops();
    let container = env.host.container();
    assert_eq!(
        ops.last(),
        Some(&HostOp::Append {
            parent: container,
            child: env.host.find_by_tag("ul")[0],
        })
    );
    assert_eq!(ops.iter().filter(|op| matches!(op, HostOp::Create { .. })).count(), 3);
}

#[test]
fn keyed_reorder_moves_one_node() {
    let env = Env::new();
    env.root.render(list(&["a", "b", "c"]));
    env.flush();
    let items = env.host.find_by_tag("li");
    let ul = env.host.find_by_tag("ul")[0];
    env.host.take_ops();

    env.root.render(list(&["a", "c", "b"]));
    env.flush();
    assert_eq!(env.host.render_to_string(), "<ul><li>a</li><li>c</li><li>b</li></ul>");
    let ops = env.host.take_ops();
    assert_eq!(
        moves(&ops),
        vec![&HostOp::Append {
            parent: ul,
            child: items[1],
        }]
    );
    assert!(!ops.iter().any(|op| matches!(op, HostOp::Create { .. })));
}

#[test]
fn attribute_changes_are_reported_by_name() {
    let env = Env::new();
    env.root.render(host("input").attr("value", "a").attr("disabled", true));
    env.flush();
    let input = env.host.find_by_tag("input")[0];
    env.host.take_ops();

    env.root.render(host("input").attr("value", "b"));
    env.flush();
    assert_eq!(env.host.attr(input, "value"), Some(PropValue::from("b")));
    assert_eq!(env.host.attr(input, "disabled"), None);
    assert_eq!(
        env.host.take_ops(),
        vec![HostOp::UpdateProps {
            id: input,
            changed: vec![Rc::from("value"), Rc::from("disabled")],
        }]
    );
}

#[test]
fn dispatched_handler_updates_state() {
    let env = Env::new();
    let counter = Component::new("Counter", |cx, _props| {
        let (count, set) = cx.use_state(|| 0)?;
        Ok(host("button")
            .on("click", move || set.update(|count| count + 1))
            .child(count.to_string())
            .into())
    });
    env.root.render(counter.element());
    env.flush();
    assert_eq!(env.host.render_to_string(), "<button>0</button>");

    let button = env.host.find_by_tag("button")[0];
    assert!(env.host.dispatch(button, "click"));
    assert!(env.host.dispatch(button, "click"));
    assert!(!env.host.dispatch(button, "hover"));
    env.flush();
    assert_eq!(env.host.render_to_string(), "<button>2</button>");
    let text = env.host.children(button)[0];
    assert_eq!(env.host.text(text).as_deref(), Some("2"));
}

#[test]
fn invalid_mutations_are_rejected() {
    let host = MemoryHost::new();
    let container = host.container();
    let missing = NodeId(99);
    assert_eq!(
        host.append_child(&container, &missing),
        Err(HostError::NodeNotFound("#99".to_owned()))
    );

    let text = host.create_text_instance("hi");
    assert!(matches!(
        host.remove_child(&container, &text),
        Err(HostError::NotAChild { .. })
    ));
    let other = host.create_container();
    assert!(host.append_child(&other, &text).is_ok());
    assert_eq!(host.parent(text), Some(other));
    assert_eq!(host.render_to_string(), "");
}

#[test]
fn unmount_removes_everything() {
    let env = Env::new();
    env.root.render(list(&["a"]));
    env.flush();
    env.root.unmount();
    assert_eq!(env.host.render_to_string(), "");
    assert!(env.host.children(env.host.container()).is_empty());
}
