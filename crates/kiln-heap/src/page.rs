//! Pages and the page list.
//!
//! A [`Page`] is a contiguous extent of the pool, claimed or free. The
//! [`PageList`] keeps pages in offset order as a singly linked list whose
//! nodes live in a `Vec` and link by index. Removed nodes go onto a vacant
//! list and are reused by the next insert, so splitting and merging pages
//! does no per-node heap allocation once the arena has warmed up.

use std::fmt;

/// A tracked extent `[offset, offset + size)` of the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    /// First byte of the extent.
    pub offset: u32,
    /// Length in bytes.
    pub size: u32,
    /// Whether the extent is handed out.
    pub claimed: bool,
}

impl Page {
    /// An unclaimed page.
    pub fn free(offset: u32, size: u32) -> Self {
        Self {
            offset,
            size,
            claimed: false,
        }
    }

    /// A claimed page.
    pub fn claimed(offset: u32, size: u32) -> Self {
        Self {
            offset,
            size,
            claimed: true,
        }
    }

    /// One past the last byte.
    pub fn end(&self) -> u32 {
        self.offset + self.size
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.claimed { "claimed" } else { "free" };
        write!(f, "[{:#x}, {:#x}) {state}", self.offset, self.end())
    }
}

/// Index of a node in a [`PageList`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeId(u32);

struct Node {
    page: Page,
    next: Option<NodeId>,
}

/// Singly linked list of pages in offset order, stored as an index arena.
#[derive(Default)]
pub struct PageList {
    nodes: Vec<Node>,
    head: Option<NodeId>,
    len: usize,
    /// Slots of removed nodes, reused before the arena grows.
    vacant: Vec<NodeId>,
}

impl PageList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pages in the list.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First node, if any.
    pub fn head(&self) -> Option<NodeId> {
        self.head
    }

    /// Node after `id`, if any.
    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0 as usize].next
    }

    /// The page stored at `id`.
    pub fn get(&self, id: NodeId) -> &Page {
        &self.nodes[id.0 as usize].page
    }

    /// Mutable access to the page stored at `id`.
    pub fn get_mut(&mut self, id: NodeId) -> &mut Page {
        &mut self.nodes[id.0 as usize].page
    }

    /// Insert `page` after `at`, or at the head when `at` is `None`.
    ///
    /// The caller keeps the list in offset order.
    pub fn insert_after(&mut self, at: Option<NodeId>, page: Page) -> NodeId {
        let next = match at {
            Some(at) => self.next(at),
            None => self.head,
        };
        let node = Node { page, next };
        let id = match self.vacant.pop() {
            Some(id) => {
                self.nodes[id.0 as usize] = node;
                id
            }
            None => {
                let id = NodeId(self.nodes.len() as u32);
                self.nodes.push(node);
                id
            }
        };
        match at {
            Some(at) => self.nodes[at.0 as usize].next = Some(id),
            None => self.head = Some(id),
        }
        self.len += 1;
        id
    }

    /// Remove the node after `at`, or the head when `at` is `None`.
    /// Returns the removed page, or `None` if there is no such node.
    pub fn remove_after(&mut self, at: Option<NodeId>) -> Option<Page> {
        let victim = match at {
            Some(at) => self.next(at)?,
            None => self.head?,
        };
        let after = self.next(victim);
        match at {
            Some(at) => self.nodes[at.0 as usize].next = after,
            None => self.head = after,
        }
        self.vacant.push(victim);
        self.len -= 1;
        Some(self.nodes[victim.0 as usize].page)
    }

    /// Iterate pages in list order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    /// Number of node slots allocated in the arena (live + vacant).
    pub fn arena_capacity(&self) -> usize {
        self.nodes.len()
    }
}

/// Iterator over the pages of a [`PageList`].
pub struct Iter<'a> {
    list: &'a PageList,
    cursor: Option<NodeId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Page;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        self.cursor = self.list.next(id);
        Some(self.list.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets(list: &PageList) -> Vec<u32> {
        list.iter().map(|p| p.offset).collect()
    }

    #[test]
    fn insert_at_head_and_after() {
        let mut list = PageList::new();
        let a = list.insert_after(None, Page::free(0, 8));
        list.insert_after(Some(a), Page::free(16, 8));
        list.insert_after(Some(a), Page::free(8, 8));
        assert_eq!(offsets(&list), vec![0, 8, 16]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn remove_head_and_middle() {
        let mut list = PageList::new();
        let a = list.insert_after(None, Page::free(0, 8));
        let b = list.insert_after(Some(a), Page::free(8, 8));
        list.insert_after(Some(b), Page::free(16, 8));

        assert_eq!(list.remove_after(Some(a)).map(|p| p.offset), Some(8));
        assert_eq!(offsets(&list), vec![0, 16]);
        assert_eq!(list.remove_after(None).map(|p| p.offset), Some(0));
        assert_eq!(offsets(&list), vec![16]);
    }

    #[test]
    fn remove_past_tail_is_noop() {
        let mut list = PageList::new();
        let a = list.insert_after(None, Page::free(0, 8));
        assert!(list.remove_after(Some(a)).is_none());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn vacant_slots_are_reused() {
        let mut list = PageList::new();
        let a = list.insert_after(None, Page::free(0, 8));
        list.insert_after(Some(a), Page::free(8, 8));
        list.remove_after(Some(a));
        list.insert_after(Some(a), Page::free(8, 8));
        assert_eq!(list.arena_capacity(), 2);
    }

    #[test]
    fn page_display() {
        assert_eq!(Page::claimed(8, 8).to_string(), "[0x8, 0x10) claimed");
    }
}
