//! The directory/file tree. Every lookup is a structural walk from the root,
//! a path never matches an unrelated sibling that merely shares a prefix.
pub mod node;
pub mod path;

use crate::error::NamespaceError;
use node::{BlockId, Directory, FileMeta, NamespaceNode};
use path::{join_path, split_parent, split_path, validate_name};

type Result<T> = std::result::Result<T, NamespaceError>;

#[derive(Debug, Clone)]
pub struct Namespace {
    root: Directory,
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

impl Namespace {
    pub fn new() -> Self {
        Self {
            root: Directory::new("/"),
        }
    }

    fn directory(&self, components: &[&str], path: &str) -> Result<&Directory> {
        let mut current = &self.root;
        for component in components {
            match current.children.get(*component) {
                Some(NamespaceNode::Directory(directory)) => current = directory,
                _ => return Err(NamespaceError::NotFound(path.to_owned())),
            }
        }
        Ok(current)
    }

    fn directory_mut(&mut self, components: &[&str], path: &str) -> Result<&mut Directory> {
        let mut current = &mut self.root;
        for component in components {
            match current.children.get_mut(*component) {
                Some(NamespaceNode::Directory(directory)) => current = directory,
                _ => return Err(NamespaceError::NotFound(path.to_owned())),
            }
        }
        Ok(current)
    }

    pub fn create_directory(&mut self, parent_path: &str, name: &str) -> Result<String> {
        validate_name(name)?;
        let mut components = split_path(parent_path)?;
        let parent = self.directory_mut(&components, parent_path)?;
        components.push(name);
        let directory_path = join_path(&components);
        if parent.children.contains_key(name) {
            return Err(NamespaceError::AlreadyExists(directory_path));
        }
        parent
            .children
            .insert(name.to_owned(), NamespaceNode::Directory(Directory::new(name)));
        Ok(directory_path)
    }

    pub fn delete_directory(&mut self, path: &str) -> Result<()> {
        let (parent_components, name) = split_parent(path)?;
        let parent = self.directory_mut(&parent_components, path)?;
        match parent.children.get(name) {
            Some(NamespaceNode::Directory(directory)) if !directory.children.is_empty() => {
                Err(NamespaceError::NotEmpty(path.to_owned()))
            }
            Some(NamespaceNode::Directory(_)) => {
                parent.children.remove(name);
                Ok(())
            }
            _ => Err(NamespaceError::NotFound(path.to_owned())),
        }
    }

    /// Re-parents a file node. All checks run before the tree is touched so a
    /// failed move leaves both locations as they were.
    pub fn move_file(&mut self, source_path: &str, destination_path: &str) -> Result<()> {
        let (source_parent, source_name) = split_parent(source_path)?;
        let (destination_parent, destination_name) = split_parent(destination_path)?;
        match self
            .directory(&source_parent, source_path)?
            .children
            .get(source_name)
        {
            Some(NamespaceNode::File(_)) => {}
            _ => return Err(NamespaceError::NotFound(source_path.to_owned())),
        }
        if self
            .directory(&destination_parent, destination_path)?
            .children
            .contains_key(destination_name)
        {
            return Err(NamespaceError::AlreadyExists(destination_path.to_owned()));
        }
        let mut node = self
            .directory_mut(&source_parent, source_path)?
            .children
            .remove(source_name)
            .ok_or_else(|| NamespaceError::NotFound(source_path.to_owned()))?;
        node.set_name(destination_name);
        self.directory_mut(&destination_parent, destination_path)?
            .children
            .insert(destination_name.to_owned(), node);
        Ok(())
    }

    /// Fails the way `create_file` would, without inserting anything.
    pub fn check_file_creatable(&self, path: &str) -> Result<()> {
        let (parent_components, name) = split_parent(path)?;
        if self
            .directory(&parent_components, path)?
            .children
            .contains_key(name)
        {
            return Err(NamespaceError::AlreadyExists(path.to_owned()));
        }
        Ok(())
    }

    pub fn create_file(
        &mut self,
        path: &str,
        size_bytes: u64,
        block_size_bytes: u64,
        block_ids: Vec<BlockId>,
    ) -> Result<()> {
        let expected = FileMeta::expected_block_count(size_bytes, block_size_bytes);
        if block_ids.len() != expected || (block_size_bytes == 0 && size_bytes > 0) {
            return Err(NamespaceError::InconsistentBlocks {
                path: path.to_owned(),
                size: size_bytes,
                expected,
                found: block_ids.len(),
            });
        }
        let (parent_components, name) = split_parent(path)?;
        let parent = self.directory_mut(&parent_components, path)?;
        if parent.children.contains_key(name) {
            return Err(NamespaceError::AlreadyExists(path.to_owned()));
        }
        parent.children.insert(
            name.to_owned(),
            NamespaceNode::File(FileMeta {
                name: name.to_owned(),
                size_bytes,
                block_size_bytes,
                block_ids,
            }),
        );
        Ok(())
    }

    pub fn file(&self, path: &str) -> Result<&FileMeta> {
        let (parent_components, name) = split_parent(path)?;
        match self
            .directory(&parent_components, path)?
            .children
            .get(name)
        {
            Some(NamespaceNode::File(file)) => Ok(file),
            _ => Err(NamespaceError::NotFound(path.to_owned())),
        }
    }

    /// Names of the immediate children, sorted.
    pub fn list_directory_contents(&self, path: &str) -> Result<Vec<String>> {
        let components = split_path(path)?;
        let mut names: Vec<String> = self
            .directory(&components, path)?
            .children
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn traverse_directory(&self, path: &str) -> Result<&Directory> {
        let components = split_path(path)?;
        self.directory(&components, path)
    }

    /// (files, directories) in the whole tree, the root included.
    pub fn count_nodes(&self) -> (usize, usize) {
        let (files, directories) = self.root.count_nodes();
        (files, directories + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_blocks(count: usize) -> Vec<BlockId> {
        (0..count).map(|i| format!("blk-{i}")).collect()
    }

    #[test]
    fn created_directory_is_listed_once_and_gone_after_delete() {
        let mut namespace = Namespace::new();
        namespace.create_directory("/", "docs").unwrap();
        assert_eq!(
            namespace.create_directory("/docs", "x").unwrap(),
            "/docs/x".to_string()
        );
        let listing = namespace.list_directory_contents("/docs").unwrap();
        assert_eq!(listing.iter().filter(|name| *name == "x").count(), 1);
        assert_eq!(
            namespace.create_directory("/docs", "x"),
            Err(NamespaceError::AlreadyExists("/docs/x".into()))
        );

        namespace.delete_directory("/docs/x").unwrap();
        assert!(
            !namespace
                .list_directory_contents("/docs")
                .unwrap()
                .contains(&"x".to_string())
        );
    }

    #[test]
    fn create_directory_needs_an_existing_parent_directory() {
        let mut namespace = Namespace::new();
        assert_eq!(
            namespace.create_directory("/missing", "x"),
            Err(NamespaceError::NotFound("/missing".into()))
        );
        namespace
            .create_file("/a.txt", 10, 8, file_blocks(2))
            .unwrap();
        assert!(matches!(
            namespace.create_directory("/a.txt", "x"),
            Err(NamespaceError::NotFound(_))
        ));
    }

    #[test]
    fn non_empty_directory_is_not_deleted() {
        let mut namespace = Namespace::new();
        namespace.create_directory("/", "docs").unwrap();
        namespace
            .create_file("/docs/a.txt", 100, 64, file_blocks(2))
            .unwrap();
        assert_eq!(
            namespace.delete_directory("/docs"),
            Err(NamespaceError::NotEmpty("/docs".into()))
        );
        assert!(namespace.traverse_directory("/docs").is_ok());
        assert!(namespace.file("/docs/a.txt").is_ok());
    }

    #[test]
    fn delete_directory_rejects_files_and_root() {
        let mut namespace = Namespace::new();
        namespace.create_file("/a.txt", 0, 8, vec![]).unwrap();
        assert!(matches!(
            namespace.delete_directory("/a.txt"),
            Err(NamespaceError::NotFound(_))
        ));
        assert!(matches!(
            namespace.delete_directory("/"),
            Err(NamespaceError::InvalidPath(_))
        ));
        assert!(matches!(
            namespace.delete_directory("/nope"),
            Err(NamespaceError::NotFound(_))
        ));
    }

    #[test]
    fn move_keeps_file_metadata() {
        let mut namespace = Namespace::new();
        namespace.create_directory("/", "src").unwrap();
        namespace.create_directory("/", "dst").unwrap();
        namespace
            .create_file("/src/a.bin", 3000, 1024, file_blocks(3))
            .unwrap();
        let before = namespace.file("/src/a.bin").unwrap().clone();

        namespace.move_file("/src/a.bin", "/dst/b.bin").unwrap();
        let after = namespace.file("/dst/b.bin").unwrap();
        assert_eq!(after.name, "b.bin");
        assert_eq!(after.size_bytes, before.size_bytes);
        assert_eq!(after.block_size_bytes, before.block_size_bytes);
        assert_eq!(after.block_ids, before.block_ids);
        assert!(matches!(
            namespace.file("/src/a.bin"),
            Err(NamespaceError::NotFound(_))
        ));
    }

    #[test]
    fn failed_move_changes_nothing() {
        let mut namespace = Namespace::new();
        namespace.create_directory("/", "docs").unwrap();
        namespace.create_file("/a", 1, 8, file_blocks(1)).unwrap();
        namespace.create_file("/b", 1, 8, file_blocks(1)).unwrap();

        assert_eq!(
            namespace.move_file("/a", "/b"),
            Err(NamespaceError::AlreadyExists("/b".into()))
        );
        assert!(matches!(
            namespace.move_file("/a", "/missing/a"),
            Err(NamespaceError::NotFound(_))
        ));
        // directories are not moved by move_file
        assert!(matches!(
            namespace.move_file("/docs", "/docs2"),
            Err(NamespaceError::NotFound(_))
        ));
        assert!(namespace.file("/a").is_ok());
        assert!(namespace.file("/b").is_ok());
        assert!(namespace.traverse_directory("/docs").is_ok());
    }

    #[test]
    fn prefix_sibling_is_not_listed() {
        let mut namespace = Namespace::new();
        namespace.create_directory("/", "a").unwrap();
        namespace.create_directory("/", "ab").unwrap();
        namespace.create_file("/ab/inner", 0, 8, vec![]).unwrap();
        assert!(namespace.list_directory_contents("/a").unwrap().is_empty());
        assert_eq!(
            namespace.list_directory_contents("/").unwrap(),
            vec!["a".to_string(), "ab".to_string()]
        );
    }

    #[test]
    fn file_block_count_must_cover_the_size() {
        let mut namespace = Namespace::new();
        assert!(matches!(
            namespace.create_file("/a", 2049, 1024, file_blocks(2)),
            Err(NamespaceError::InconsistentBlocks { expected: 3, .. })
        ));
        namespace
            .create_file("/a", 2049, 1024, file_blocks(3))
            .unwrap();
        assert_eq!(
            namespace.create_file("/a", 1, 1024, file_blocks(1)),
            Err(NamespaceError::AlreadyExists("/a".into()))
        );
        assert_eq!(
            namespace.check_file_creatable("/a"),
            Err(NamespaceError::AlreadyExists("/a".into()))
        );
        assert_eq!(namespace.count_nodes(), (1, 1));
    }
}
