//! `DeleteResult` handlers for bulk deletes

use super::{DecodeError, HandlerStack, HandlerTable, ResponseDecoder, TagHandler};
use crate::s3::types::{DeleteError, DeleteObjectsResult, DeletedObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteTag {
    DeleteResult,
    Deleted,
    Error,
    Key,
    VersionId,
    Code,
    Message,
    Unknown,
}

impl TagHandler for DeleteTag {
    type Context = DeleteObjectsResult;

    fn on_start(self, ctx: &mut DeleteObjectsResult) -> Result<(), DecodeError> {
        match self {
            DeleteTag::Deleted => ctx.deleted.push(DeletedObject::default()),
            DeleteTag::Error => ctx.errors.push(DeleteError::default()),
            _ => {}
        }
        Ok(())
    }

    fn on_text(
        self,
        ctx: &mut DeleteObjectsResult,
        text: &str,
        stack: &HandlerStack<Self>,
    ) -> Result<(), DecodeError> {
        match (stack.top_minus_one(), self) {
            (Some(DeleteTag::Deleted), DeleteTag::Key) => current_deleted(ctx)?.key.push_str(text),
            (Some(DeleteTag::Deleted), DeleteTag::VersionId) => {
                current_deleted(ctx)?
                    .version_id
                    .get_or_insert_with(String::new)
                    .push_str(text);
            }
            (Some(DeleteTag::Error), DeleteTag::Key) => current_error(ctx)?.key.push_str(text),
            (Some(DeleteTag::Error), DeleteTag::Code) => current_error(ctx)?.code.push_str(text),
            (Some(DeleteTag::Error), DeleteTag::Message) => current_error(ctx)?.message.push_str(text),
            _ => {}
        }
        Ok(())
    }
}

fn current_deleted(ctx: &mut DeleteObjectsResult) -> Result<&mut DeletedObject, DecodeError> {
    ctx.deleted
        .last_mut()
        .ok_or_else(|| DecodeError::Malformed("text outside <Deleted>".to_string()))
}

fn current_error(ctx: &mut DeleteObjectsResult) -> Result<&mut DeleteError, DecodeError> {
    ctx.errors
        .last_mut()
        .ok_or_else(|| DecodeError::Malformed("text outside <Error>".to_string()))
}

pub fn delete_handlers() -> HandlerTable<DeleteTag> {
    HandlerTable::new(DeleteTag::Unknown)
        .with("DeleteResult", DeleteTag::DeleteResult)
        .with("Deleted", DeleteTag::Deleted)
        .with("Error", DeleteTag::Error)
        .with("Key", DeleteTag::Key)
        .with("VersionId", DeleteTag::VersionId)
        .with("Code", DeleteTag::Code)
        .with("Message", DeleteTag::Message)
}

#[derive(Debug, Clone)]
pub struct DeleteResultDecoder {
    decoder: ResponseDecoder<DeleteTag>,
}

impl DeleteResultDecoder {
    pub fn new() -> Self {
        Self {
            decoder: ResponseDecoder::new(delete_handlers()),
        }
    }

    pub fn decode(&self, body: &[u8]) -> Result<DeleteObjectsResult, DecodeError> {
        let mut result = DeleteObjectsResult::new();
        self.decoder.decode(body, &mut result)?;
        Ok(result)
    }
}

impl Default for DeleteResultDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_delete_result() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<DeleteResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Deleted>
    <Key>sample1.txt</Key>
  </Deleted>
  <Deleted>
    <Key>sample2.txt</Key>
    <VersionId>v2</VersionId>
  </Deleted>
  <Error>
    <Key>sample3.txt</Key>
    <Code>AccessDenied</Code>
    <Message>Access Denied</Message>
  </Error>
</DeleteResult>"#;

        let result = DeleteResultDecoder::new().decode(body.as_bytes()).unwrap();
        assert_eq!(result.deleted.len(), 2);
        assert_eq!(result.deleted[0].key, "sample1.txt");
        assert_eq!(result.deleted[1].version_id.as_deref(), Some("v2"));
        assert_eq!(
            result.errors,
            vec![DeleteError {
                key: "sample3.txt".to_string(),
                code: "AccessDenied".to_string(),
                message: "Access Denied".to_string(),
            }]
        );
    }

    #[test]
    fn test_empty_result() {
        let result = DeleteResultDecoder::new().decode(b"<DeleteResult/>").unwrap();
        assert!(result.deleted.is_empty());
        assert!(result.errors.is_empty());
    }
}
