//! Storage handlers

use serde_json::json;

use crate::command::registry::HandlerResult;
use crate::command::{params, JsonMap};
use crate::error::EngineError;
use crate::hal::DeviceBackend;

use super::backend_err;

const DEFAULT_READ_LIMIT: usize = 4096;

pub async fn list(backend: &dyn DeviceBackend, p: &JsonMap) -> HandlerResult {
    let path = params::get_str(p, "path").unwrap_or("/");
    let entries = backend.file_list(path).await.map_err(backend_err)?;

    let mut dirs: Vec<_> = entries.iter().filter(|e| e.is_dir).collect();
    let mut files: Vec<_> = entries.iter().filter(|e| !e.is_dir).collect();
    dirs.sort_by_key(|e| e.name.to_lowercase());
    files.sort_by_key(|e| e.name.to_lowercase());

    Ok(json!({
        "type": "file_list",
        "path": path,
        "directories": dirs
            .iter()
            .map(|e| json!({"name": e.name, "type": "directory"}))
            .collect::<Vec<_>>(),
        "files": files
            .iter()
            .map(|e| json!({"name": e.name, "size": e.size, "type": "file"}))
            .collect::<Vec<_>>(),
        "total": entries.len(),
    }))
}

pub async fn read(backend: &dyn DeviceBackend, p: &JsonMap) -> HandlerResult {
    let Some(filename) = params::get_str(p, "filename") else {
        return Err(EngineError::Validation("Filename required".into()));
    };
    let max_size = params::get_int::<usize>(p, "max_size").unwrap_or(DEFAULT_READ_LIMIT);

    let file = backend
        .file_read(filename, max_size)
        .await
        .map_err(backend_err)?;

    Ok(json!({
        "type": "file_read",
        "filename": filename,
        "size": file.content.len(),
        "content": file.content,
        "truncated": file.truncated,
    }))
}

pub async fn write(backend: &dyn DeviceBackend, p: &JsonMap) -> HandlerResult {
    let Some(filename) = params::get_str(p, "filename") else {
        return Err(EngineError::Validation("Filename required".into()));
    };
    let content = params::get_str(p, "content").unwrap_or("");
    let append = params::get_str(p, "mode") == Some("a");

    let size = backend
        .file_write(filename, content, append)
        .await
        .map_err(backend_err)?;

    Ok(json!({
        "type": "file_write",
        "filename": filename,
        "size": size,
        "success": true,
    }))
}

pub async fn delete(backend: &dyn DeviceBackend, p: &JsonMap) -> HandlerResult {
    let Some(path) = params::get_str(p, "path").or_else(|| params::get_str(p, "filename")) else {
        return Err(EngineError::Validation("Path required".into()));
    };

    backend.file_delete(path).await.map_err(backend_err)?;

    Ok(json!({
        "type": "file_delete",
        "path": path,
        "success": true,
    }))
}

pub async fn mkdir(backend: &dyn DeviceBackend, p: &JsonMap) -> HandlerResult {
    let Some(path) = params::get_str(p, "path") else {
        return Err(EngineError::Validation("Path required".into()));
    };

    backend.file_mkdir(path).await.map_err(backend_err)?;

    Ok(json!({
        "type": "file_mkdir",
        "path": path,
        "success": true,
    }))
}
