//! 测试用的内存后端

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::access::{
    AccessError, CreationEvents, CreationQueue, ElementAccess, ProcessDirectory, ScreenSource,
    TextAttribute, WindowSnapshot, WindowSource,
};
use crate::{Point, Rect, ScreenGeometry, Size};

#[derive(Debug, Default)]
struct Node {
    role: String,
    subrole: Option<String>,
    identifier: Option<String>,
    title: Option<String>,
    size: Size,
    position: Point,
    settable: bool,
    children: Vec<usize>,
    size_failures: u32,
    dead: bool,
    reject_writes: bool,
}

pub(crate) struct FakeBackend {
    nodes: RefCell<Vec<Node>>,
    // 句柄值 → 真实节点，模拟多个句柄指向同一对象
    handles: RefCell<Vec<usize>>,
    windows: RefCell<Vec<WindowSnapshot>>,
    apps: RefCell<HashMap<i32, usize>>,
    processes: RefCell<HashMap<String, i32>>,
    screen: Cell<Option<ScreenGeometry>>,
    subscriptions: RefCell<HashMap<i32, CreationQueue<usize>>>,
    writes: Cell<usize>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            nodes: RefCell::new(Vec::new()),
            handles: RefCell::new(Vec::new()),
            windows: RefCell::new(Vec::new()),
            apps: RefCell::new(HashMap::new()),
            processes: RefCell::new(HashMap::new()),
            screen: Cell::new(None),
            subscriptions: RefCell::new(HashMap::new()),
            writes: Cell::new(0),
        }
    }

    fn node_of(&self, handle: usize) -> usize {
        self.handles.borrow()[handle]
    }

    fn push_node(&self, node: Node) -> usize {
        let mut nodes = self.nodes.borrow_mut();
        nodes.push(node);
        let index = nodes.len() - 1;
        let mut handles = self.handles.borrow_mut();
        handles.push(index);
        handles.len() - 1
    }

    pub fn add_root(&self, role: &str, size: Size) -> usize {
        self.push_node(Node {
            role: role.to_string(),
            size,
            settable: true,
            ..Default::default()
        })
    }

    pub fn add_child(&self, parent: usize, role: &str, size: Size) -> usize {
        let parent_position = self.nodes.borrow()[self.node_of(parent)].position;
        let child = self.push_node(Node {
            role: role.to_string(),
            size,
            position: parent_position,
            ..Default::default()
        });
        let parent_node = self.node_of(parent);
        let child_node = self.node_of(child);
        self.nodes.borrow_mut()[parent_node].children.push(child_node);
        child
    }

    pub fn set_subrole(&self, handle: usize, subrole: &str) {
        let n = self.node_of(handle);
        self.nodes.borrow_mut()[n].subrole = Some(subrole.to_string());
    }

    pub fn set_identifier(&self, handle: usize, identifier: &str) {
        let n = self.node_of(handle);
        self.nodes.borrow_mut()[n].identifier = Some(identifier.to_string());
    }

    pub fn set_title(&self, handle: usize, title: &str) {
        let n = self.node_of(handle);
        self.nodes.borrow_mut()[n].title = Some(title.to_string());
    }

    pub fn set_settable(&self, handle: usize, settable: bool) {
        let n = self.node_of(handle);
        self.nodes.borrow_mut()[n].settable = settable;
    }

    pub fn reject_writes(&self, handle: usize) {
        let n = self.node_of(handle);
        self.nodes.borrow_mut()[n].reject_writes = true;
    }

    /// 把元素放到绝对位置，子树跟着平移
    pub fn place(&self, handle: usize, position: Point) {
        let n = self.node_of(handle);
        let current = self.nodes.borrow()[n].position;
        self.translate(n, position.delta_from(current));
    }

    /// 模拟系统动画把元素推开
    pub fn nudge(&self, handle: usize, delta: Point) {
        let n = self.node_of(handle);
        self.translate(n, delta);
    }

    fn translate(&self, node: usize, delta: Point) {
        let children = {
            let mut nodes = self.nodes.borrow_mut();
            nodes[node].position = nodes[node].position.offset(delta);
            nodes[node].children.clone()
        };
        for child in children {
            self.translate(child, delta);
        }
    }

    pub fn current_position(&self, handle: usize) -> Point {
        self.nodes.borrow()[self.node_of(handle)].position
    }

    pub fn resize(&self, handle: usize, size: Size) {
        let n = self.node_of(handle);
        self.nodes.borrow_mut()[n].size = size;
    }

    pub fn fail_size_times(&self, handle: usize, times: u32) {
        let n = self.node_of(handle);
        self.nodes.borrow_mut()[n].size_failures = times;
    }

    /// 元素被销毁，之后所有查询失败
    pub fn kill(&self, handle: usize) {
        let n = self.node_of(handle);
        self.nodes.borrow_mut()[n].dead = true;
    }

    /// 为同一个对象再发一个不同的句柄值
    pub fn alias(&self, handle: usize) -> usize {
        let n = self.node_of(handle);
        let mut handles = self.handles.borrow_mut();
        handles.push(n);
        handles.len() - 1
    }

    /// 注册一个应用根元素
    pub fn add_app(&self, pid: i32) -> usize {
        let app = self.add_root("AXApplication", Size::default());
        self.set_settable(app, false);
        self.apps.borrow_mut().insert(pid, app);
        app
    }

    pub fn add_window(&self, number: u32, owner_pid: i32, bounds: Rect) {
        self.windows.borrow_mut().push(WindowSnapshot {
            number,
            owner_pid,
            layer: 0,
            bounds,
        });
    }

    pub fn remove_window(&self, number: u32) {
        self.windows.borrow_mut().retain(|w| w.number != number);
    }

    pub fn set_process(&self, bundle_id: &str, pid: i32) {
        self.processes
            .borrow_mut()
            .insert(bundle_id.to_string(), pid);
    }

    pub fn remove_process(&self, bundle_id: &str) {
        self.processes.borrow_mut().remove(bundle_id);
    }

    pub fn set_screen(&self, geometry: ScreenGeometry) {
        self.screen.set(Some(geometry));
    }

    pub fn subscribed_pids(&self) -> Vec<i32> {
        let mut pids: Vec<i32> = self.subscriptions.borrow().keys().copied().collect();
        pids.sort();
        pids
    }

    /// 模拟平台在其他线程投递窗口创建事件
    pub fn emit_created(&self, pid: i32, handle: usize) -> bool {
        match self.subscriptions.borrow().get(&pid) {
            Some(queue) => {
                queue.push(handle);
                true
            }
            None => false,
        }
    }

    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    fn live_node(&self, handle: &usize) -> Result<usize, AccessError> {
        let n = self.node_of(*handle);
        if self.nodes.borrow()[n].dead {
            return Err(AccessError::InvalidElement);
        }
        Ok(n)
    }
}

impl ElementAccess for FakeBackend {
    type Element = usize;

    fn position(&self, element: &usize) -> Result<Point, AccessError> {
        let n = self.live_node(element)?;
        Ok(self.nodes.borrow()[n].position)
    }

    fn set_position(&self, element: &usize, position: Point) -> Result<(), AccessError> {
        let n = self.live_node(element)?;
        let (settable, rejects) = {
            let nodes = self.nodes.borrow();
            (nodes[n].settable, nodes[n].reject_writes)
        };
        if !settable || rejects {
            return Err(AccessError::AttributeWriteFailed {
                attribute: "AXPosition",
                code: -25200,
            });
        }
        self.writes.set(self.writes.get() + 1);
        self.place(*element, position);
        Ok(())
    }

    fn size(&self, element: &usize) -> Result<Size, AccessError> {
        let n = self.live_node(element)?;
        let mut nodes = self.nodes.borrow_mut();
        if nodes[n].size_failures > 0 {
            nodes[n].size_failures -= 1;
            return Err(AccessError::AttributeUnavailable { attribute: "AXSize" });
        }
        Ok(nodes[n].size)
    }

    fn is_position_settable(&self, element: &usize) -> bool {
        match self.live_node(element) {
            Ok(n) => self.nodes.borrow()[n].settable,
            Err(_) => false,
        }
    }

    fn text(&self, element: &usize, attribute: TextAttribute) -> Option<String> {
        let n = self.live_node(element).ok()?;
        let nodes = self.nodes.borrow();
        match attribute {
            TextAttribute::Role => Some(nodes[n].role.clone()),
            TextAttribute::Subrole => nodes[n].subrole.clone(),
            TextAttribute::Identifier => nodes[n].identifier.clone(),
            TextAttribute::Title => nodes[n].title.clone(),
        }
    }

    fn children(&self, element: &usize) -> Vec<usize> {
        let Ok(n) = self.live_node(element) else {
            return Vec::new();
        };
        let child_nodes = self.nodes.borrow()[n].children.clone();
        // 子节点的句柄就是它首次创建时拿到的句柄
        let handles = self.handles.borrow();
        child_nodes
            .into_iter()
            .filter_map(|node| handles.iter().position(|&h| h == node))
            .collect()
    }

    fn application(&self, pid: i32) -> Option<usize> {
        self.apps.borrow().get(&pid).copied()
    }

    fn identity_hash(&self, element: &usize) -> u64 {
        self.node_of(*element) as u64
    }

    fn same_element(&self, a: &usize, b: &usize) -> bool {
        self.node_of(*a) == self.node_of(*b)
    }
}

impl WindowSource for FakeBackend {
    fn on_screen_windows(&self) -> Vec<WindowSnapshot> {
        self.windows.borrow().clone()
    }
}

impl ProcessDirectory for FakeBackend {
    fn pid_for_bundle(&self, bundle_id: &str) -> Result<i32, AccessError> {
        self.processes
            .borrow()
            .get(bundle_id)
            .copied()
            .ok_or_else(|| AccessError::ProcessNotFound {
                bundle_id: bundle_id.to_string(),
            })
    }
}

impl ScreenSource for FakeBackend {
    fn main_screen(&self) -> Option<ScreenGeometry> {
        self.screen.get()
    }
}

impl CreationEvents for FakeBackend {
    fn subscribe_window_created(
        &mut self,
        pid: i32,
        queue: CreationQueue<usize>,
    ) -> Result<(), AccessError> {
        if !self.apps.borrow().contains_key(&pid) {
            return Err(AccessError::ObserverFailed { pid, code: -25204 });
        }
        self.subscriptions.borrow_mut().insert(pid, queue);
        Ok(())
    }

    fn unsubscribe_window_created(&mut self, pid: i32) {
        self.subscriptions.borrow_mut().remove(&pid);
    }
}
