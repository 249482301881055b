//! Operation catalog
//!
//! Each operation has a fixed HTTP method and a rule producing the canonical
//! resource that is signed. The canonical resource never contains query
//! filters: listings sign `/` regardless of prefix or marker.

use hyper::Method;

/// The verb set the transport knows how to sign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Put,
    List,
    Delete,
    BulkDelete,
}

impl Operation {
    /// HTTP method on the wire
    pub fn method(self) -> Method {
        match self {
            Operation::Get | Operation::List => Method::GET,
            Operation::Put => Method::PUT,
            Operation::Delete => Method::DELETE,
            Operation::BulkDelete => Method::POST,
        }
    }

    /// Verb written as the first line of the string to sign
    pub fn signing_verb(self) -> &'static str {
        match self {
            Operation::Get | Operation::List => "GET",
            Operation::Put => "PUT",
            Operation::Delete => "DELETE",
            Operation::BulkDelete => "POST",
        }
    }

    /// Append the canonical resource for `path_and_query` to `out`.
    ///
    /// Object operations sign `/<object-path>`; the query (if any) is dropped.
    pub fn write_resource_name(self, path_and_query: &str, out: &mut String) {
        match self {
            Operation::List => out.push('/'),
            Operation::Get | Operation::Put | Operation::Delete => {
                write_object_path(path_and_query, out);
            }
            Operation::BulkDelete => {
                write_object_path(path_and_query, out);
                out.push_str("?delete");
            }
        }
    }

    /// Canonical resource as an owned string
    pub fn resource_name(self, path_and_query: &str) -> String {
        let mut out = String::with_capacity(path_and_query.len() + 8);
        self.write_resource_name(path_and_query, &mut out);
        out
    }

    pub fn name(self) -> &'static str {
        match self {
            Operation::Get => "GET",
            Operation::Put => "PUT",
            Operation::List => "LIST",
            Operation::Delete => "DELETE",
            Operation::BulkDelete => "BULK_DELETE",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn write_object_path(path_and_query: &str, out: &mut String) {
    let path = path_and_query
        .split_once('?')
        .map_or(path_and_query, |(path, _)| path);

    if !path.starts_with('/') {
        out.push('/');
    }
    out.push_str(path);
}
