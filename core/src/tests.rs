use core::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::{
    Component, Context, Error, HostConfig, HostError, Lanes, Node, NodeRef, Priority, Props, Resource, Root,
    RootMode, Scheduler, SetState, Task, TaskHandle, TaskStatus, deps, host, suspense, text,
};

#[derive(Debug, Default)]
struct HostNode {
    tag: Option<Rc<str>>,
    text: String,
    children: Vec<usize>,
    parent: Option<usize>,
    hidden: bool,
}

#[derive(Default)]
struct HostState {
    nodes: RefCell<Vec<HostNode>>,
    microtasks: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    ops: RefCell<Vec<String>>,
}

/// Array-backed host recording every mutation.
#[derive(Clone, Default)]
struct TestHost(Rc<HostState>);

impl TestHost {
    fn push(&self, node: HostNode) -> usize {
        let mut nodes = self.0.nodes.borrow_mut();
        nodes.push(node);
        nodes.len() - 1
    }

    fn detach(&self, child: usize) {
        let mut nodes = self.0.nodes.borrow_mut();
        if let Some(parent) = nodes[child].parent.take() {
            nodes[parent].children.retain(|c| *c != child);
        }
    }

    fn log(&self, op: String) {
        self.0.ops.borrow_mut().push(op);
    }

    fn take_ops(&self) -> Vec<String> {
        core::mem::take(&mut *self.0.ops.borrow_mut())
    }

    fn flush_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.0.microtasks.borrow_mut().pop_front();
            let Some(task) = next else {
                return ran;
            };
            task();
            ran += 1;
        }
    }

    fn label(&self, id: usize) -> String {
        let nodes = self.0.nodes.borrow();
        match &nodes[id].tag {
            Some(tag) => tag.to_string(),
            None => format!("{:?}", nodes[id].text),
        }
    }

    fn html(&self, id: usize) -> String {
        let nodes = self.0.nodes.borrow();
        let mut out = String::new();
        for child in &nodes[id].children {
            write_node(&nodes, *child, &mut out);
        }
        out
    }
}

fn write_node(nodes: &[HostNode], id: usize, out: &mut String) {
    let node = &nodes[id];
    if node.hidden {
        return;
    }
    match &node.tag {
        None => out.push_str(&node.text),
        Some(tag) => {
            out.push_str(&format!("<{tag}>"));
            for child in &node.children {
                write_node(nodes, *child, out);
            }
            out.push_str(&format!("</{tag}>"));
        }
    }
}

impl HostConfig for TestHost {
    type Instance = usize;

    fn create_instance(&self, tag: &str, _props: &Props) -> usize {
        self.log(format!("create {tag}"));
        self.push(HostNode {
            tag: Some(tag.into()),
            ..HostNode::default()
        })
    }

    fn create_text_instance(&self, text: &str) -> usize {
        self.push(HostNode {
            text: text.to_owned(),
            ..HostNode::default()
        })
    }

    fn append_child(&self, parent: &usize, child: &usize) -> Result<(), HostError> {
        self.log(format!("append {}", self.label(*child)));
        self.detach(*child);
        let mut nodes = self.0.nodes.borrow_mut();
        nodes[*parent].children.push(*child);
        nodes[*child].parent = Some(*parent);
        Ok(())
    }

    fn insert_before(&self, parent: &usize, child: &usize, before: &usize) -> Result<(), HostError> {
        self.log(format!("insert {} before {}", self.label(*child), self.label(*before)));
        self.detach(*child);
        let mut nodes = self.0.nodes.borrow_mut();
        let Some(index) = nodes[*parent].children.iter().position(|c| c == before) else {
            return Err(HostError::NotAChild {
                parent: parent.to_string(),
                child: before.to_string(),
            });
        };
        nodes[*parent].children.insert(index, *child);
        nodes[*child].parent = Some(*parent);
        Ok(())
    }

    fn remove_child(&self, parent: &usize, child: &usize) -> Result<(), HostError> {
        self.log(format!("remove {}", self.label(*child)));
        let mut nodes = self.0.nodes.borrow_mut();
        let before = nodes[*parent].children.len();
        nodes[*parent].children.retain(|c| c != child);
        if nodes[*parent].children.len() == before {
            return Err(HostError::NotAChild {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }
        nodes[*child].parent = None;
        Ok(())
    }

    fn set_text_content(&self, instance: &usize, text: &str) {
        self.log(format!("text {text:?}"));
        self.0.nodes.borrow_mut()[*instance].text = text.to_owned();
    }

    fn apply_props(&self, instance: &usize, _old: &Props, _new: &Props) {
        self.log(format!("props {}", self.label(*instance)));
    }

    fn set_visibility(&self, instance: &usize, hidden: bool) {
        self.log(format!("{} {}", if hidden { "hide" } else { "show" }, self.label(*instance)));
        self.0.nodes.borrow_mut()[*instance].hidden = hidden;
    }

    fn schedule_microtask(&self, task: Box<dyn FnOnce()>) {
        self.0.microtasks.borrow_mut().push_back(task);
    }
}

/// Runs tasks one at a time, most urgent first.
#[derive(Default)]
struct TestScheduler {
    queue: RefCell<Vec<(u64, Priority, Task)>>,
    next_id: Cell<u64>,
    running: Cell<Option<u64>>,
    running_cancelled: Cell<bool>,
    priority: Cell<Priority>,
    /// Units of work allowed before `should_yield` turns true.
    budget: Cell<Option<usize>>,
}

impl TestScheduler {
    fn run_next(&self) -> bool {
        let entry = {
            let mut queue = self.queue.borrow_mut();
            let Some(index) = (0..queue.len()).min_by_key(|i| (queue[*i].1, queue[*i].0)) else {
                return false;
            };
            queue.remove(index)
        };
        let (id, priority, mut task) = entry;
        self.running.set(Some(id));
        self.running_cancelled.set(false);
        let previous = self.priority.replace(priority);
        let status = task(false);
        self.priority.set(previous);
        self.running.set(None);
        if status == TaskStatus::Continue && !self.running_cancelled.get() {
            self.queue.borrow_mut().push((id, priority, task));
        }
        true
    }
}

impl Scheduler for TestScheduler {
    fn schedule(&self, priority: Priority, task: Task) -> TaskHandle {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.queue.borrow_mut().push((id, priority, task));
        TaskHandle::new(id)
    }

    fn cancel(&self, handle: TaskHandle) {
        if self.running.get() == Some(handle.raw()) {
            self.running_cancelled.set(true);
        }
        self.queue.borrow_mut().retain(|(id, ..)| *id != handle.raw());
    }

    fn current_priority(&self) -> Priority {
        self.priority.get()
    }

    fn should_yield(&self) -> bool {
        match self.budget.get() {
            Some(0) => true,
            Some(left) => {
                self.budget.set(Some(left - 1));
                false
            }
            None => false,
        }
    }

    fn run_with_priority(&self, priority: Priority, f: &mut dyn FnMut()) {
        let previous = self.priority.replace(priority);
        f();
        self.priority.set(previous);
    }
}

struct Env {
    host: TestHost,
    scheduler: Rc<TestScheduler>,
    container: usize,
    root: Root<TestHost>,
}

impl Env {
    fn new() -> Self {
        Self::with_mode(RootMode::Concurrent)
    }

    fn with_mode(mode: RootMode) -> Self {
        let host = TestHost::default();
        let container = host.create_instance("root", &Props::default());
        host.take_ops();
        let scheduler = Rc::new(TestScheduler::default());
        let root = Root::builder(host.clone(), container, scheduler.clone())
            .mode(mode)
            .label("test")
            .build();
        Self {
            host,
            scheduler,
            container,
            root,
        }
    }

    fn flush(&self) {
        loop {
            let ran = self.host.flush_microtasks();
            if !self.scheduler.run_next() && ran == 0 {
                break;
            }
        }
    }

    fn html(&self) -> String {
        self.host.html(self.container)
    }
}

fn item(key: &str) -> Node {
    host("li").key(key).child(key).into()
}

fn list(keys: &[&str]) -> Node {
    host("ul").children(keys.iter().map(|key| item(key))).into()
}

type Slot<T> = Rc<RefCell<Option<SetState<T>>>>;

fn counter(slot: &Slot<i32>, renders: &Rc<Cell<usize>>) -> Component {
    let slot = slot.clone();
    let renders = renders.clone();
    Component::new("Counter", move |cx, _props| {
        renders.set(renders.get() + 1);
        let (count, set) = cx.use_state(|| 0)?;
        *slot.borrow_mut() = Some(set);
        Ok(host("span").child(count.to_string()).into())
    })
}

fn setter<T>(slot: &Slot<T>) -> SetState<T> {
    slot.borrow().clone().expect("component rendered")
}

#[test]
fn first_render_is_synchronous() {
    let env = Env::new();
    env.root.render(host("div").child("hello"));
    assert_eq!(env.html(), "");

    env.host.flush_microtasks();
    assert_eq!(env.html(), "<div>hello</div>");
    let stats = env.root.last_commit().expect("committed");
    assert_eq!(stats.lane, Lanes::SYNC);
    assert_eq!(stats.placements, 1);
}

#[test]
fn keyed_move_places_only_the_moved_child() {
    let env = Env::new();
    env.root.render(list(&["a", "b", "c"]));
    env.flush();
    env.host.take_ops();

    env.root.render(list(&["a", "c", "b"]));
    env.flush();
    assert_eq!(env.html(), "<ul><li>a</li><li>c</li><li>b</li></ul>");
    assert_eq!(env.host.take_ops(), vec!["append li".to_owned()]);
    let stats = env.root.last_commit().expect("committed");
    assert_eq!((stats.placements, stats.deletions), (1, 0));
}

#[test]
fn replaced_child_is_inserted_before_its_stable_sibling() {
    let env = Env::new();
    env.root.render(list(&["a", "b", "c"]));
    env.flush();
    env.host.take_ops();

    env.root.render(list(&["a", "d", "c"]));
    env.flush();
    assert_eq!(env.html(), "<ul><li>a</li><li>d</li><li>c</li></ul>");
    let ops = env.host.take_ops();
    assert!(ops.contains(&"remove li".to_owned()), "{ops:?}");
    assert!(ops.contains(&"insert li before li".to_owned()), "{ops:?}");
    let stats = env.root.last_commit().expect("committed");
    assert_eq!((stats.placements, stats.deletions), (1, 1));
}

#[test]
fn identical_element_commits_nothing() {
    let env = Env::new();
    let tree: Node = host("div").child(host("p").child("x")).into();
    env.root.render(tree.clone());
    env.flush();
    env.host.take_ops();

    env.root.render(tree);
    env.flush();
    assert!(env.host.take_ops().is_empty());
    let stats = env.root.last_commit().expect("committed");
    assert!(stats.mutation_flags.is_empty());
}

#[test]
fn state_updates_apply_in_enqueue_order() {
    let env = Env::new();
    let slot = Slot::default();
    let renders = Rc::new(Cell::new(0));
    env.root.render(counter(&slot, &renders).element());
    env.flush();
    assert_eq!(env.html(), "<span>0</span>");

    let set = setter(&slot);
    set.update(|count| count + 1);
    set.update(|count| count + 1);
    set.set(10);
    set.update(|count| count + 1);
    env.flush();
    assert_eq!(env.html(), "<span>11</span>");
    assert_eq!(renders.get(), 2);
}

#[test]
fn setting_the_same_state_bails_out_of_children() {
    let env = Env::new();
    let slot = Slot::default();
    let renders = Rc::new(Cell::new(0));
    env.root.render(counter(&slot, &renders).element());
    env.flush();
    env.host.take_ops();

    setter(&slot).set(0);
    env.flush();
    assert!(env.host.take_ops().is_empty());
}

#[test]
fn effects_follow_their_dependencies() {
    let env = Env::new();
    let log = Rc::new(RefCell::new(Vec::<String>::new()));
    let effect_log = log.clone();
    let watcher = Component::new("Watcher", move |cx, props| {
        let n = props.int("n").unwrap_or_default();
        let log = effect_log.clone();
        cx.use_effect(Some(deps![n]), move || {
            log.borrow_mut().push(format!("create {n}"));
            let log = log.clone();
            crate::Cleanup::new(move || log.borrow_mut().push(format!("destroy {n}")))
        })?;
        Ok(Node::Empty)
    });

    env.root.render(watcher.element().attr("n", 1));
    env.flush();
    assert_eq!(*log.borrow(), ["create 1"]);

    env.root.render(watcher.element().attr("n", 1));
    env.flush();
    assert_eq!(*log.borrow(), ["create 1"]);

    env.root.render(watcher.element().attr("n", 2));
    env.flush();
    assert_eq!(*log.borrow(), ["create 1", "destroy 1", "create 2"]);

    env.root.unmount();
    assert_eq!(*log.borrow(), ["create 1", "destroy 1", "create 2", "destroy 2"]);
}

#[test]
fn suspense_shows_fallback_until_the_resource_resolves() {
    let env = Env::new();
    let (resource, resolver) = Resource::<String>::pending();
    let reader = Component::new("Reader", move |cx, _props| {
        let value = cx.use_value(&resource)?;
        Ok(text(value.as_str()))
    });

    env.root
        .render(suspense("loading").child(host("p").child(reader.element())));
    env.flush();
    assert_eq!(env.html(), "loading");

    resolver.resolve("done".to_owned());
    env.flush();
    assert_eq!(env.html(), "<p>done</p>");
}

#[test]
fn suspended_update_hides_committed_content_behind_the_fallback() {
    let env = Env::new();
    let (resource, resolver) = Resource::<String>::pending();
    let slot: Slot<bool> = Slot::default();
    let switch_slot = slot.clone();
    let switch = Component::new("Switch", move |cx, _props| {
        let (load, set) = cx.use_state(|| false)?;
        *switch_slot.borrow_mut() = Some(set);
        if !load {
            return Ok(host("span").child("idle").into());
        }
        let value = cx.use_value(&resource)?;
        Ok(host("span").child(value.as_str()).into())
    });

    env.root.render(
        suspense("loading")
            .child(host("b").child("static"))
            .child(switch.element()),
    );
    env.flush();
    assert_eq!(env.html(), "<b>static</b><span>idle</span>");
    env.host.take_ops();

    setter(&slot).set(true);
    env.flush();
    // The committed host nodes are hidden, not destroyed.
    assert_eq!(env.html(), "loading");
    let ops = env.host.take_ops();
    assert!(ops.contains(&"hide b".to_owned()), "{ops:?}");
    assert!(!ops.iter().any(|op| op.starts_with("remove")), "{ops:?}");

    resolver.resolve("fresh".to_owned());
    env.flush();
    assert_eq!(env.html(), "<b>static</b><span>fresh</span>");
    assert_eq!(env.root.last_commit().expect("committed").visibility_changes, 1);
}

#[test]
fn suspension_without_a_boundary_commits_nothing() {
    let env = Env::new();
    env.root.render(host("div").child("before"));
    env.flush();

    let (resource, resolver) = Resource::<String>::pending();
    let reader = Component::new("Reader", move |cx, _props| {
        let value = cx.use_value(&resource)?;
        Ok(text(value.as_str()))
    });
    env.root.render(reader.element());
    env.flush();
    assert_eq!(env.html(), "<div>before</div>");
    assert!(env.root.pending_lanes().contains(Lanes::DEFAULT));

    resolver.resolve("after".to_owned());
    env.flush();
    assert_eq!(env.html(), "after");
    assert!(env.root.pending_lanes().is_empty());
}

#[test]
fn hook_count_change_is_reported_and_keeps_the_tree() {
    let env = Env::new();
    let flaky = Component::new("Flaky", |cx, props| {
        if props.int("hooks") == Some(1) {
            cx.use_state(|| 0)?;
        }
        Ok(text("flaky"))
    });

    env.root.render(flaky.element().attr("hooks", 1));
    env.flush();
    assert_eq!(env.html(), "flaky");

    env.root.render(flaky.element().attr("hooks", 0));
    env.flush();
    assert!(matches!(env.root.take_error(), Some(Error::TooFewHooks { .. })));
    assert_eq!(env.html(), "flaky");
    assert!(env.root.pending_lanes().is_empty());
}

#[test]
fn higher_priority_update_restarts_an_interrupted_render() {
    let env = Env::new();
    env.root.render(list(&[]));
    env.flush();

    env.scheduler.budget.set(Some(1));
    env.root.render(list(&["slow", "work"]));
    assert!(env.scheduler.run_next());
    assert_eq!(env.html(), "<ul></ul>");

    env.root.discrete_updates(|| env.root.render(list(&["urgent"])));
    env.scheduler.budget.set(None);
    env.host.flush_microtasks();
    assert_eq!(env.html(), "<ul><li>urgent</li></ul>");
    assert_eq!(env.root.last_commit().expect("committed").lane, Lanes::SYNC);

    // The default update replays before the sync one on its own lane.
    env.flush();
    assert_eq!(env.html(), "<ul><li>urgent</li></ul>");
    assert_eq!(env.root.last_commit().expect("committed").lane, Lanes::DEFAULT);
}

#[test]
fn context_change_reaches_consumers_behind_memo() {
    let env = Env::new();
    let theme = Context::new(0_i64);
    let consumer_theme = theme.clone();
    let consumer = Component::new("Consumer", move |cx, _props| {
        let value = cx.use_context(&consumer_theme);
        Ok(text(value.to_string()))
    });
    let wall = Component::new("Wall", |_cx, props| Ok(props.children().clone())).memo();
    let inner = wall.element().child(consumer.element()).build();

    let slot: Slot<i64> = Slot::default();
    let app_slot = slot.clone();
    let app = Component::new("App", move |cx, _props| {
        let (value, set) = cx.use_state(|| 1_i64)?;
        *app_slot.borrow_mut() = Some(set);
        Ok(theme.provider(value).child(inner.clone()).into())
    });

    env.root.render(app.element());
    env.flush();
    assert_eq!(env.html(), "1");

    setter(&slot).set(5);
    env.flush();
    assert_eq!(env.html(), "5");
}

#[test]
fn node_ref_is_attached_after_commit_and_detached_on_removal() {
    let env = Env::new();
    let node_ref = NodeRef::new();
    env.root.render(host("input").node_ref(&node_ref));
    assert!(!node_ref.is_attached());

    env.flush();
    let instance = node_ref.get::<usize>().expect("attached");
    assert_eq!(env.host.label(instance), "input");

    env.root.render(Node::Empty);
    env.flush();
    assert!(!node_ref.is_attached());
}

#[test]
fn repeated_updates_do_not_grow_the_fiber_arena() {
    let env = Env::new();
    let slot = Slot::default();
    let renders = Rc::new(Cell::new(0));
    env.root.render(host("main").child(counter(&slot, &renders).element()));
    env.flush();

    setter(&slot).update(|count| count + 1);
    env.flush();
    let settled = env.root.fiber_count();
    for _ in 0..20 {
        setter(&slot).update(|count| count + 1);
        env.flush();
    }
    assert_eq!(env.root.fiber_count(), settled);
    assert_eq!(env.html(), "<main><span>21</span></main>");
}

#[test]
fn legacy_updates_are_synchronous() {
    let env = Env::with_mode(RootMode::Legacy);
    let slot = Slot::default();
    let renders = Rc::new(Cell::new(0));
    env.root.render(counter(&slot, &renders).element());
    env.host.flush_microtasks();

    setter(&slot).set(3);
    assert_eq!(env.root.pending_lanes(), Lanes::SYNC);
    env.host.flush_microtasks();
    assert_eq!(env.html(), "<span>3</span>");
    assert!(env.scheduler.queue.borrow().is_empty());
}

#[test]
fn updates_inside_a_transition_use_the_transition_lane() {
    let env = Env::new();
    let slot = Slot::default();
    let renders = Rc::new(Cell::new(0));
    env.root.render(counter(&slot, &renders).element());
    env.flush();

    env.root.start_transition(|| setter(&slot).set(7));
    assert_eq!(env.root.pending_lanes(), Lanes::TRANSITION);
    env.flush();
    assert_eq!(env.html(), "<span>7</span>");
}
