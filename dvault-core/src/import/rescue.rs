use crate::error::{Result, VaultError};
use crate::names::jcr;
use crate::node::{self, ContentNode};
use crate::session::Session;

/// Replaces a node's content while keeping children the new content lacks
///
/// [`RescueTransformer::begin`] moves every existing child of the target
/// into a scratch node below the root. The new content is then streamed in
/// with [`start_node`](RescueTransformer::start_node) and
/// [`end_node`](RescueTransformer::end_node); the first node started is the
/// target itself. [`finish`](RescueTransformer::finish) moves the rescued
/// children back. When the new content supplied a child of the same name,
/// the two are merged: the new child keeps its own state, gains the
/// preserved properties it lacks and every rescued grandchild it does not
/// supply, recursively.
#[derive(Debug)]
pub struct RescueTransformer {
    target: String,
    scratch: String,
    rescued: Vec<String>,
    preserved: Vec<String>,
    stack: Vec<String>,
    started: bool,
}

impl RescueTransformer {
    /// Move the children of `target` into a fresh scratch node
    pub fn begin(session: &mut dyn Session, target: &str) -> Result<Self> {
        let scratch_name = format!("tmp-{}", uuid::Uuid::new_v4().simple());
        let scratch = session.add_node("/", &scratch_name, jcr::NT_UNSTRUCTURED)?;

        let names: Vec<String> = session
            .require_node(target)?
            .children
            .iter()
            .map(|c| c.name.clone())
            .filter(|name| *name != scratch_name)
            .collect();

        let mut rescued = Vec::with_capacity(names.len());
        for name in names {
            let src = node::join(target, &name);
            match session.move_node(&src, &node::join(&scratch, &name)) {
                Ok(()) => rescued.push(name),
                Err(e) => tracing::error!("unable to rescue {}: {}", src, e),
            }
        }
        tracing::debug!("rescued {} child node(s) of {} to {}", rescued.len(), target, scratch);

        Ok(Self {
            target: target.to_string(),
            scratch,
            rescued,
            preserved: Vec::new(),
            stack: Vec::new(),
            started: false,
        })
    }

    /// Properties that existing nodes keep even though the new content
    /// does not carry them
    pub fn with_preserved_properties(mut self, names: Vec<String>) -> Self {
        self.preserved = names;
        self
    }

    fn is_preserved(&self, name: &str) -> bool {
        self.preserved.iter().any(|p| p == name)
    }

    pub fn scratch_path(&self) -> &str {
        &self.scratch
    }

    /// Apply the next node of the new content
    ///
    /// Only the node's own state is used; its children must be started
    /// separately.
    pub fn start_node(&mut self, session: &mut dyn Session, new: &ContentNode) -> Result<()> {
        let path = match self.stack.last() {
            None if self.started => {
                return Err(VaultError::Malformed(format!(
                    "second root node {} in replacement of {}",
                    new.name, self.target
                )));
            }
            None => {
                self.started = true;
                let target = self.target.clone();
                self.replace_target(session, &target, new)?;
                target
            }
            Some(parent) => {
                let path = session.add_node(parent, &new.name, &new.primary_type)?;
                if !new.mixins.is_empty() {
                    session.set_mixins(&path, new.mixins.clone())?;
                }
                for property in &new.properties {
                    session.set_property(&path, property.clone())?;
                }
                path
            }
        };
        self.stack.push(path);
        Ok(())
    }

    pub fn end_node(&mut self) -> Result<()> {
        self.stack
            .pop()
            .map(|_| ())
            .ok_or_else(|| VaultError::Malformed(format!("unbalanced end in replacement of {}", self.target)))
    }

    fn replace_target(&self, session: &mut dyn Session, target: &str, new: &ContentNode) -> Result<()> {
        session.set_primary_type(target, &new.primary_type)?;
        session.set_mixins(target, new.mixins.clone())?;

        let existing = session.require_node(target)?;
        let stale_properties: Vec<String> = existing
            .properties
            .iter()
            .map(|p| p.name().to_string())
            .filter(|name| new.property(name).is_none() && !self.is_preserved(name))
            .collect();
        let scratch_name = node::name_of(&self.scratch);
        let leftover_children: Vec<String> = existing
            .children
            .iter()
            .filter(|c| c.name != scratch_name)
            .map(|c| node::join(target, &c.name))
            .collect();

        for name in stale_properties {
            session.remove_property(target, &name)?;
        }
        for property in &new.properties {
            session.set_property(target, property.clone())?;
        }
        for child in leftover_children {
            session.remove_node(&child)?;
        }
        Ok(())
    }

    /// Move rescued children back under the target and drop the scratch node
    ///
    /// Returns the paths of the nodes that were moved back.
    pub fn finish(self, session: &mut dyn Session) -> Result<Vec<String>> {
        if !self.stack.is_empty() {
            return Err(VaultError::Malformed(format!(
                "replacement of {} ended with {} open node(s)",
                self.target,
                self.stack.len()
            )));
        }

        let mut restored = Vec::new();
        for name in &self.rescued {
            let src = node::join(&self.scratch, name);
            if session.node_exists(&src)? {
                self.restore(session, &src, &node::join(&self.target, name), &mut restored)?;
            }
        }

        let left = session.require_node(&self.scratch)?.children.len();
        if left == 0 {
            session.remove_node(&self.scratch)?;
        } else {
            tracing::warn!("{} rescued node(s) left in {}", left, self.scratch);
        }
        Ok(restored)
    }

    /// Move `src` to `dest`, merging into a node the new content supplied
    fn restore(&self, session: &mut dyn Session, src: &str, dest: &str, restored: &mut Vec<String>) -> Result<()> {
        if !session.node_exists(dest)? {
            match session.move_node(src, dest) {
                Ok(()) => restored.push(dest.to_string()),
                Err(e) => tracing::warn!("unable to restore {} from {}: {}", dest, src, e),
            }
            return Ok(());
        }

        let rescued = session.require_node(src)?.clone();
        let kept: Vec<_> = {
            let supplied = session.require_node(dest)?;
            rescued
                .properties
                .iter()
                .filter(|p| self.is_preserved(p.name()) && supplied.property(p.name()).is_none())
                .cloned()
                .collect()
        };
        for property in kept {
            session.set_property(dest, property)?;
        }
        for child in &rescued.children {
            self.restore(session, &node::join(src, &child.name), &node::join(dest, &child.name), restored)?;
        }

        if session.require_node(src)?.children.is_empty() {
            tracing::debug!("merged rescued {} into {}", src, dest);
            session.remove_node(src)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySession;
    use crate::value::{Property, Value};

    fn session() -> MemorySession {
        let mut s = MemorySession::new();
        s.add_node("/", "page", "nt:unstructured").unwrap();
        s.set_property("/page", Property::string("title", "Old")).unwrap();
        s.set_property("/page", Property::string("stale", "x")).unwrap();
        s.add_node("/page", "x", "nt:unstructured").unwrap();
        s.set_property("/page/x", Property::new("n", Value::Long(1))).unwrap();
        s.add_node("/page", "y", "nt:folder").unwrap();
        s.set_property("/page/y", Property::string("kept", "yes")).unwrap();
        s
    }

    fn replace(session: &mut MemorySession, new: &ContentNode) -> Vec<String> {
        let mut transformer = RescueTransformer::begin(session, "/page").unwrap();
        fn walk(t: &mut RescueTransformer, s: &mut MemorySession, n: &ContentNode) {
            t.start_node(s, n).unwrap();
            for child in &n.children {
                walk(t, s, child);
            }
            t.end_node().unwrap();
        }
        walk(&mut transformer, session, new);
        transformer.finish(session).unwrap()
    }

    #[test]
    fn test_children_not_resupplied_survive() {
        let mut s = session();
        let before_x = s.require_node("/page/x").unwrap().clone();
        let before_y = s.require_node("/page/y").unwrap().clone();
        let new = ContentNode::new("page", "nt:unstructured").with_property(Property::string("title", "New"));

        let restored = replace(&mut s, &new);
        assert_eq!(restored, vec!["/page/x", "/page/y"]);

        let page = s.require_node("/page").unwrap();
        assert_eq!(page.property("title"), Some(&Property::string("title", "New")));
        assert!(page.property("stale").is_none());
        assert_eq!(s.require_node("/page/x").unwrap(), &before_x);
        assert_eq!(s.require_node("/page/y").unwrap(), &before_y);
        assert!(!s.root().children.iter().any(|c| c.name.starts_with("tmp-")));
    }

    #[test]
    fn test_new_child_wins_on_collision() {
        let mut s = session();
        let new = ContentNode::new("page", "nt:folder")
            .with_mixin("mix:title")
            .with_child(ContentNode::new("x", "nt:unstructured").with_property(Property::string("n", "new")))
            .with_child(ContentNode::new("z", "nt:unstructured"));

        let restored = replace(&mut s, &new);
        assert_eq!(restored, vec!["/page/y"]);

        let page = s.require_node("/page").unwrap();
        assert_eq!(page.primary_type, "nt:folder");
        assert_eq!(page.mixins, vec!["mix:title".to_string()]);
        let names: Vec<&str> = page.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["x", "z", "y"]);
        assert_eq!(
            s.require_node("/page/x").unwrap().property("n"),
            Some(&Property::string("n", "new"))
        );
        assert!(!s.root().children.iter().any(|c| c.name.starts_with("tmp-")));
    }

    #[test]
    fn test_collision_keeps_rescued_grandchildren() {
        let mut s = session();
        s.add_node("/page/x", "rep:policy", "rep:ACL").unwrap();
        s.add_node("/page/x", "text", "nt:unstructured").unwrap();
        s.set_property("/page/x/text", Property::string("v", "old")).unwrap();
        s.add_node("/page/x/text", "deep", "nt:unstructured").unwrap();
        let new = ContentNode::new("page", "nt:unstructured").with_child(
            ContentNode::new("x", "nt:unstructured")
                .with_child(ContentNode::new("text", "nt:unstructured").with_property(Property::string("v", "new"))),
        );

        let restored = replace(&mut s, &new);
        assert_eq!(restored, vec!["/page/x/rep:policy", "/page/x/text/deep", "/page/y"]);

        let x = s.require_node("/page/x").unwrap();
        assert!(x.property("n").is_none());
        let names: Vec<&str> = x.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["text", "rep:policy"]);
        assert_eq!(
            s.require_node("/page/x/text").unwrap().property("v"),
            Some(&Property::string("v", "new"))
        );
        assert!(s.node_exists("/page/x/text/deep").unwrap());
        assert!(!s.root().children.iter().any(|c| c.name.starts_with("tmp-")));
    }

    #[test]
    fn test_preserved_properties_survive() {
        let mut s = session();
        s.set_property("/page", Property::string("secret", "s")).unwrap();
        s.set_property("/page/x", Property::string("secret", "t")).unwrap();
        let new = ContentNode::new("page", "nt:unstructured")
            .with_child(ContentNode::new("x", "nt:unstructured"));

        let mut transformer = RescueTransformer::begin(&mut s, "/page")
            .unwrap()
            .with_preserved_properties(vec!["secret".to_string()]);
        transformer.start_node(&mut s, &new).unwrap();
        transformer.start_node(&mut s, &new.children[0]).unwrap();
        transformer.end_node().unwrap();
        transformer.end_node().unwrap();
        transformer.finish(&mut s).unwrap();

        let page = s.require_node("/page").unwrap();
        assert_eq!(page.property("secret"), Some(&Property::string("secret", "s")));
        assert!(page.property("stale").is_none());
        let x = s.require_node("/page/x").unwrap();
        assert_eq!(x.property("secret"), Some(&Property::string("secret", "t")));
        assert!(x.property("n").is_none());
    }

    #[test]
    fn test_scratch_lives_below_root() {
        let mut s = session();
        let transformer = RescueTransformer::begin(&mut s, "/page").unwrap();
        let scratch = transformer.scratch_path().to_string();
        assert!(scratch.starts_with("/tmp-"));
        assert_eq!(s.require_node(&scratch).unwrap().children.len(), 2);
        assert!(s.require_node("/page").unwrap().children.is_empty());
    }

    #[test]
    fn test_unbalanced_stream_is_rejected() {
        let mut s = session();
        let mut transformer = RescueTransformer::begin(&mut s, "/page").unwrap();
        assert!(transformer.end_node().is_err());
        transformer
            .start_node(&mut s, &ContentNode::new("page", "nt:unstructured"))
            .unwrap();
        assert!(transformer.finish(&mut s).is_err());
    }
}
