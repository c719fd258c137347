use crate::error::NamespaceError;

/// Splits a dfs path into its components. Both `/a/b` and `a/b` name the
/// same node, `/` and the empty string name the root.
pub fn split_path(path: &str) -> Result<Vec<&str>, NamespaceError> {
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    if components.iter().any(|c| *c == "." || *c == "..") {
        return Err(NamespaceError::InvalidPath(path.to_owned()));
    }
    Ok(components)
}

pub fn join_path(components: &[&str]) -> String {
    format!("/{}", components.join("/"))
}

pub fn validate_name(name: &str) -> Result<(), NamespaceError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(NamespaceError::InvalidPath(name.to_owned()));
    }
    Ok(())
}

/// Splits a path into its parent components and the final name. The root has
/// no name and is rejected.
pub fn split_parent(path: &str) -> Result<(Vec<&str>, &str), NamespaceError> {
    let mut components = split_path(path)?;
    match components.pop() {
        Some(name) => Ok((components, name)),
        None => Err(NamespaceError::InvalidPath(path.to_owned())),
    }
}
