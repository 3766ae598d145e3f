//! JSON input and output of the command line tool

use crate::vm::ClassGraph;
use crate::weave::{Error, MixinDeclaration};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// A program along with the mixins to weave into it
///
/// ```json
/// {
///   "program": { "demo/Target": { "methods": [ ... ] }, ... },
///   "mixins": [ { "name": "demo/Patch", "targets": ["demo/Target"], ... } ]
/// }
/// ```
///
/// Mixin classes (with the bodies of their methods) are part of the program.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub program: ClassGraph,

    #[serde(default)]
    pub mixins: Vec<MixinDeclaration>,
}

impl Manifest {
    pub fn from_path(path: &Path) -> Result<Manifest, Error> {
        let reader = BufReader::new(File::open(path)?);
        let mut manifest: Manifest = serde_json::from_reader(reader)?;
        manifest.program.insert_runtime_types();
        Ok(manifest)
    }
}

/// Write a program as pretty-printed JSON
pub fn write_program<W: Write>(program: &ClassGraph, writer: W) -> Result<(), Error> {
    let mut writer = BufWriter::new(writer);
    serde_json::to_writer_pretty(&mut writer, program)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vm::{BinaryName, Host, Name};

    #[test]
    fn manifest_json() {
        let json = r#"{
            "program": {
                "demo/Target": {
                    "methods": [
                        {
                            "name": "run",
                            "descriptor": "()V",
                            "code": {
                                "entries": [
                                    { "label": 0, "instruction": "Return" }
                                ]
                            }
                        }
                    ]
                }
            },
            "mixins": [
                { "name": "demo/Patch", "targets": ["demo/Target"], "methods": [] }
            ]
        }"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        let target = BinaryName::from_string("demo/Target".to_owned()).unwrap();
        assert!(manifest.program.has_class(&target));
        assert_eq!(manifest.mixins[0].targets, vec![target]);

        let mut out = vec![];
        write_program(&manifest.program, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\"demo/Target\""));
        assert!(text.ends_with('\n'));
    }
}
