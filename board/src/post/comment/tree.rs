use std::collections::{HashMap, hash_map::Entry};

use serde::Serialize;

use crate::post::models::comment::{Comment, CommentId};

/// Deepest reply level that is nested in a [`Thread`]. Replies below it are
/// listed flat under their ancestor at this level.
pub const MAX_REPLY_DEPTH: usize = 32;

/// A comment together with its replies, in the order they were fetched.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    /// Reply depth in the discussion, 0 for top level comments. Past
    /// [`MAX_REPLY_DEPTH`] this is deeper than the node's nesting.
    pub depth: usize,
    pub children: Vec<CommentNode>,
}

impl Drop for CommentNode {
    // Subtrees are unlinked one level at a time so that dropping a tall tree
    // never recurses.
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.children);
        }
    }
}

/// The discussion of one post.
///
/// `orphans` lists the comments that could not be attached to any thread:
/// missing parent, parent from another post and reply cycles. `duplicates`
/// lists ids fetched more than once. The first row with such an id is in the
/// tree, the ids here stand for the later rows, which were left out.
#[derive(Debug, Serialize, Clone, PartialEq, Default)]
pub struct Thread {
    pub roots: Vec<CommentNode>,
    pub orphans: Vec<CommentId>,
    pub duplicates: Vec<CommentId>,
}

impl Thread {
    /// Number of comments placed in the tree, excluded rows not counted.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&CommentNode> = self.roots.iter().collect();
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}

pub fn build_tree(comments: Vec<Comment>) -> Vec<CommentNode> {
    build_thread(comments).roots
}

/// Turns a flat list of comments, already ordered by creation time, into
/// reply threads. Roots and siblings keep the input order; nothing is
/// re-sorted. Replies whose parent can't be resolved are left out of the tree
/// and reported in [`Thread::orphans`], they are never promoted to roots.
pub fn build_thread(comments: Vec<Comment>) -> Thread {
    let len = comments.len();

    // Arena: comments are addressed by their position in the input
    let mut index = HashMap::<CommentId, usize>::with_capacity(len);
    let mut duplicate = vec![false; len];
    for (slot, comment) in comments.iter().enumerate() {
        match index.entry(comment.id) {
            Entry::Vacant(e) => {
                e.insert(slot);
            }
            Entry::Occupied(_) => duplicate[slot] = true,
        }
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); len];
    let mut roots = Vec::new();
    for (slot, comment) in comments.iter().enumerate() {
        if duplicate[slot] {
            continue;
        }

        match comment.parent_comment_id {
            None => roots.push(slot),
            Some(parent_id) => match index.get(&parent_id) {
                Some(&parent) if comments[parent].post_id == comment.post_id => {
                    children[parent].push(slot)
                }
                _ => {}
            },
        }
    }

    // Only what hangs off a root is part of the tree. A comment replying to
    // itself, or a reply cycle, never reaches a root.
    let mut depth = vec![0usize; len];
    let mut reachable = vec![false; len];
    // Where a node is nested: its parent, or its ancestor at MAX_REPLY_DEPTH
    // once the reply chain goes deeper than that
    let mut nest_under: Vec<Option<usize>> = vec![None; len];
    let mut anchor = vec![0usize; len];
    let mut preorder = Vec::with_capacity(len);
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(slot) = stack.pop() {
        reachable[slot] = true;
        preorder.push(slot);
        anchor[slot] = if depth[slot] > MAX_REPLY_DEPTH {
            nest_under[slot].unwrap_or(slot)
        } else {
            slot
        };
        for &child in children[slot].iter().rev() {
            depth[child] = depth[slot] + 1;
            nest_under[child] = Some(anchor[slot]);
            stack.push(child);
        }
    }

    let mut orphans = Vec::new();
    let mut duplicates = Vec::new();
    for (slot, comment) in comments.iter().enumerate() {
        if duplicate[slot] {
            duplicates.push(comment.id);
        } else if !reachable[slot] {
            orphans.push(comment.id);
        }
    }

    let mut nested: Vec<Vec<usize>> = vec![Vec::new(); len];
    for &slot in &preorder {
        if let Some(parent) = nest_under[slot] {
            nested[parent].push(slot);
        }
    }

    // Nested nodes always come after the node they sit under in preorder, so
    // walking it backwards builds every subtree before the node that owns it.
    let mut pending: Vec<Option<Comment>> = comments.into_iter().map(Some).collect();
    let mut built: Vec<Option<CommentNode>> = (0..len).map(|_| None).collect();
    for &slot in preorder.iter().rev() {
        let Some(comment) = pending[slot].take() else {
            continue;
        };
        let nodes = nested[slot]
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        built[slot] = Some(CommentNode {
            comment,
            depth: depth[slot],
            children: nodes,
        });
    }

    Thread {
        roots: roots.iter().filter_map(|&r| built[r].take()).collect(),
        orphans,
        duplicates,
    }
}

/// Reply depth `id` would have in the thread built from `comments`, `None`
/// if it would not be part of it.
pub fn reply_depth(comments: &[Comment], id: CommentId) -> Option<usize> {
    let mut by_id = HashMap::<CommentId, &Comment>::with_capacity(comments.len());
    for comment in comments {
        by_id.entry(comment.id).or_insert(comment);
    }

    let mut current = *by_id.get(&id)?;
    let mut depth = 0;
    while let Some(parent_id) = current.parent_comment_id {
        let parent = *by_id.get(&parent_id)?;
        if parent.post_id != current.post_id {
            return None;
        }
        depth += 1;
        // longer than the whole list means the chain loops
        if depth > comments.len() {
            return None;
        }
        current = parent;
    }
    Some(depth)
}
