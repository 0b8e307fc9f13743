//! Intrusive storage for the log store.
//!
//! A slab arena of nodes carrying three kinds of doubly-linked lists: the
//! main insertion-order list (head = newest), one list per container, and
//! one list per `(field name, field value)` pair. Links are index-based so
//! insertion and eviction are O(1) per list with no per-node allocation
//! beyond the node itself.
//!
//! Link direction convention: `next` walks toward older messages, `prev`
//! toward newer. Iterating from a list head yields newest-first.

use std::collections::HashMap;
use std::sync::Arc;

use super::message::StoredMessage;

#[derive(Debug, Clone, Copy, Default)]
pub(super) struct Link {
    pub prev: Option<usize>,
    pub next: Option<usize>,
}

#[derive(Debug, Default, Clone, Copy)]
pub(super) struct IndexList {
    pub head: Option<usize>,
    pub tail: Option<usize>,
    pub len: usize,
}

#[derive(Debug)]
struct FieldLink {
    name: String,
    value: String,
    link: Link,
}

#[derive(Debug)]
struct Node {
    msg: Arc<StoredMessage>,
    seq: u64,
    main: Link,
    container: Link,
    fields: Vec<FieldLink>,
}

#[derive(Debug, Default)]
pub(super) struct Ring {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    main: IndexList,
    by_container: HashMap<String, IndexList>,
    by_field: HashMap<String, HashMap<String, IndexList>>,
    next_seq: u64,
}

impl Ring {
    pub fn len(&self) -> usize {
        self.main.len
    }

    pub fn msg(&self, idx: usize) -> &Arc<StoredMessage> {
        &self.node(idx).msg
    }

    pub fn seq(&self, idx: usize) -> u64 {
        self.node(idx).seq
    }

    pub fn main_head(&self) -> Option<usize> {
        self.main.head
    }

    pub fn main_tail(&self) -> Option<usize> {
        self.main.tail
    }

    pub fn next_in_main(&self, idx: usize) -> Option<usize> {
        self.node(idx).main.next
    }

    pub fn container_list(&self, container_id: &str) -> Option<IndexList> {
        self.by_container.get(container_id).copied()
    }

    pub fn container_len(&self, container_id: &str) -> usize {
        self.by_container.get(container_id).map_or(0, |l| l.len)
    }

    pub fn next_in_container(&self, idx: usize) -> Option<usize> {
        self.node(idx).container.next
    }

    pub fn field_list(&self, name: &str, value: &str) -> Option<IndexList> {
        self.by_field.get(name)?.get(value).copied()
    }

    pub fn next_in_field(&self, idx: usize, name: &str, value: &str) -> Option<usize> {
        self.field_link(idx, name, value).next
    }

    /// Insert at the head of the main list, the container list, and every
    /// field list the message participates in.
    pub fn insert(&mut self, msg: Arc<StoredMessage>) -> usize {
        let seq = self.next_seq;
        self.next_seq += 1;

        let container_id = msg.container_id.clone();
        let fields: Vec<FieldLink> = msg
            .fields
            .iter()
            .map(|(name, value)| FieldLink {
                name: name.clone(),
                value: value.clone(),
                link: Link::default(),
            })
            .collect();

        let node = Node {
            msg,
            seq,
            main: Link::default(),
            container: Link::default(),
            fields,
        };
        let idx = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };

        self.push_front_main(idx);
        self.push_front_container(idx, &container_id);

        let pairs: Vec<(String, String)> = self
            .node(idx)
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.value.clone()))
            .collect();
        for (name, value) in pairs {
            self.push_front_field(idx, &name, &value);
        }

        idx
    }

    /// Unlink from every list and free the slot.
    pub fn remove(&mut self, idx: usize) -> Arc<StoredMessage> {
        let node = self.nodes[idx]
            .take()
            .expect("store index invariant violated: removing a free slot");

        // Main list.
        match node.main.prev {
            Some(p) => self.node_mut(p).main.next = node.main.next,
            None => self.main.head = node.main.next,
        }
        match node.main.next {
            Some(n) => self.node_mut(n).main.prev = node.main.prev,
            None => self.main.tail = node.main.prev,
        }
        self.main.len -= 1;

        // Container list.
        let container_id = node.msg.container_id.clone();
        match node.container.prev {
            Some(p) => self.node_mut(p).container.next = node.container.next,
            None => {
                self.container_list_mut(&container_id).head = node.container.next;
            }
        }
        match node.container.next {
            Some(n) => self.node_mut(n).container.prev = node.container.prev,
            None => {
                self.container_list_mut(&container_id).tail = node.container.prev;
            }
        }
        {
            let list = self.container_list_mut(&container_id);
            list.len -= 1;
            if list.len == 0 {
                self.by_container.remove(&container_id);
            }
        }

        // Field lists.
        for fl in &node.fields {
            if let Some(p) = fl.link.prev {
                self.field_link_mut(p, &fl.name, &fl.value).next = fl.link.next;
            }
            if let Some(n) = fl.link.next {
                self.field_link_mut(n, &fl.name, &fl.value).prev = fl.link.prev;
            }
            let values = self
                .by_field
                .get_mut(&fl.name)
                .expect("store index invariant violated: missing field index");
            let list = values
                .get_mut(&fl.value)
                .expect("store index invariant violated: missing field value list");
            if list.head == Some(idx) {
                list.head = fl.link.next;
            }
            if list.tail == Some(idx) {
                list.tail = fl.link.prev;
            }
            list.len -= 1;
            if list.len == 0 {
                values.remove(&fl.value);
                if values.is_empty() {
                    self.by_field.remove(&fl.name);
                }
            }
        }

        self.free.push(idx);
        node.msg
    }

    fn node(&self, idx: usize) -> &Node {
        self.nodes[idx]
            .as_ref()
            .expect("store index invariant violated: dangling node index")
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node {
        self.nodes[idx]
            .as_mut()
            .expect("store index invariant violated: dangling node index")
    }

    fn field_link(&self, idx: usize, name: &str, value: &str) -> Link {
        self.node(idx)
            .fields
            .iter()
            .find(|f| f.name == name && f.value == value)
            .map(|f| f.link)
            .expect("store index invariant violated: missing field link")
    }

    fn field_link_mut(&mut self, idx: usize, name: &str, value: &str) -> &mut Link {
        self.node_mut(idx)
            .fields
            .iter_mut()
            .find(|f| f.name == name && f.value == value)
            .map(|f| &mut f.link)
            .expect("store index invariant violated: missing field link")
    }

    fn container_list_mut(&mut self, container_id: &str) -> &mut IndexList {
        self.by_container
            .get_mut(container_id)
            .expect("store index invariant violated: missing container list")
    }

    fn push_front_main(&mut self, idx: usize) {
        let old_head = self.main.head;
        self.main.head = Some(idx);
        if self.main.tail.is_none() {
            self.main.tail = Some(idx);
        }
        self.main.len += 1;
        if let Some(h) = old_head {
            self.node_mut(h).main.prev = Some(idx);
        }
        self.node_mut(idx).main = Link {
            prev: None,
            next: old_head,
        };
    }

    fn push_front_container(&mut self, idx: usize, container_id: &str) {
        let list = self.by_container.entry(container_id.to_string()).or_default();
        let old_head = list.head;
        list.head = Some(idx);
        if list.tail.is_none() {
            list.tail = Some(idx);
        }
        list.len += 1;
        if let Some(h) = old_head {
            self.node_mut(h).container.prev = Some(idx);
        }
        self.node_mut(idx).container = Link {
            prev: None,
            next: old_head,
        };
    }

    fn push_front_field(&mut self, idx: usize, name: &str, value: &str) {
        let list = self
            .by_field
            .entry(name.to_string())
            .or_default()
            .entry(value.to_string())
            .or_default();
        let old_head = list.head;
        list.head = Some(idx);
        if list.tail.is_none() {
            list.tail = Some(idx);
        }
        list.len += 1;
        if let Some(h) = old_head {
            self.field_link_mut(h, name, value).prev = Some(idx);
        }
        *self.field_link_mut(idx, name, value) = Link {
            prev: None,
            next: old_head,
        };
    }
}
