use std::collections::HashSet;
use std::fs;
use std::path::Path;

use lilith::{
    build_tree, export_code_tree, split_code_file_into_chunks, stringify_code_tree, ChunkType,
    NoProgress, NodeType, TreeBuildOptions,
};

const SERVICE: &str = r#"
"""Servicio de ejemplo."""
import logging
from dataclasses import dataclass, field

logger = logging.getLogger(__name__)


@dataclass
class Settings:
    name: str
    tags: list = field(default_factory=list)

    def describe(self) -> str:
        return f"{self.name}: {self.tags}"


async def serve(settings: Settings, *, retries: int = 3, **extra):
    for attempt in range(retries):
        logger.info("intento %s", attempt)
    return {
        "ok": True,  # siempre
        "extra": extra,
    }


if __name__ == "__main__":
    serve(Settings("demo"))
"#;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn realistic_module_is_split_in_source_order() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "service.py", SERVICE);

    let chunks = split_code_file_into_chunks(&dir.path().join("service.py")).unwrap();
    let kinds: Vec<ChunkType> = chunks.iter().map(|c| c.chunk_type).collect();
    assert_eq!(
        kinds,
        vec![
            ChunkType::CodePiece,
            ChunkType::Class,
            ChunkType::Function,
            ChunkType::CodePiece,
        ]
    );

    assert!(chunks[0].code.contains("import logging"));
    assert!(chunks[0].code.contains("logger = logging.getLogger(__name__)"));
    assert!(chunks[1].code.starts_with("@dataclass\nclass Settings:\n"));
    assert!(chunks[1].code.contains("\n\n    def describe(self) -> str:\n"));
    assert!(chunks[2]
        .code
        .starts_with("async def serve(settings: Settings, *, retries: int = 3, **extra):\n"));
    assert!(chunks[2].code.contains("return {\"ok\": True, \"extra\": extra,}"));
    assert!(!chunks[2].code.contains("# siempre"));
    assert_eq!(chunks[3].code, "if __name__ == \"__main__\":\n    serve(Settings(\"demo\"))\n");
}

#[test]
fn project_tree_exports_consistent_records() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app/service.py", SERVICE);
    write(dir.path(), "app/__init__.py", "");
    write(dir.path(), "docs/index.md", "# Docs\n");
    write(dir.path(), "setup.cfg", "[metadata]\nname = demo\n");

    let tree = build_tree(dir.path(), TreeBuildOptions { sort_entries: true }, &NoProgress).unwrap();
    let records = export_code_tree(&tree);

    // raíz, app, __init__.py, service.py (+4 trozos), docs, index.md, setup.cfg
    assert_eq!(records.len(), 11);

    let ids: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids.len(), records.len());

    let mut seen = HashSet::new();
    for record in &records {
        if let Some(parent) = &record.parent {
            assert!(seen.contains(parent.as_str()), "padre ausente para {:?}", record.name);
        }
        seen.insert(record.id.as_str());
    }

    let functions: Vec<_> = records
        .iter()
        .filter(|r| r.node_type == NodeType::Function)
        .map(|r| r.name.as_deref().unwrap())
        .collect();
    assert_eq!(functions, vec!["serve(settings:Settings,*,retries:int=3,**extra)"]);

    let classes: Vec<_> = records
        .iter()
        .filter(|r| r.node_type == NodeType::Class)
        .map(|r| r.name.as_deref().unwrap())
        .collect();
    assert_eq!(classes, vec!["Settings"]);

    for record in &records {
        let has_code = matches!(
            record.node_type,
            NodeType::Function | NodeType::Class | NodeType::CodePiece
        );
        assert_eq!(record.code_content.is_some(), has_code);
        assert!(record.embedding.is_none() && record.description.is_none());
    }

    let json = serde_json::to_value(&records).unwrap();
    assert_eq!(json[0]["type"], "folder");
    assert!(json[0]["parent"].is_null());

    let rendering = stringify_code_tree(&tree);
    assert!(rendering.contains("service.py"));
    assert!(rendering.contains("<code_piece>"));
}
