//! PLY export of the reconstructed mesh.
//!
//! ASCII format with per-vertex colors:
//! - Header with vertex and face element definitions
//! - Vertex list (x, y, z, red, green, blue)
//! - Face list (vertex count + indices)

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::fusion::volume::TriangleMesh;

#[inline]
fn to_u8(c: f64) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Write `mesh` to `path` as ASCII PLY.
pub fn write_ply(mesh: &TriangleMesh, path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let has_colors = mesh.colors.len() == mesh.vertices.len();

    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "element vertex {}", mesh.num_vertices())?;
    writeln!(writer, "property float x")?;
    writeln!(writer, "property float y")?;
    writeln!(writer, "property float z")?;
    if has_colors {
        writeln!(writer, "property uchar red")?;
        writeln!(writer, "property uchar green")?;
        writeln!(writer, "property uchar blue")?;
    }
    writeln!(writer, "element face {}", mesh.num_triangles())?;
    writeln!(writer, "property list uchar int vertex_indices")?;
    writeln!(writer, "end_header")?;

    for (i, v) in mesh.vertices.iter().enumerate() {
        write!(writer, "{} {} {}", v.x as f32, v.y as f32, v.z as f32)?;
        if has_colors {
            let c = &mesh.colors[i];
            write!(writer, " {} {} {}", to_u8(c.x), to_u8(c.y), to_u8(c.z))?;
        }
        writeln!(writer)?;
    }

    for t in &mesh.triangles {
        writeln!(writer, "3 {} {} {}", t[0], t[1], t[2])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_write_ascii_ply() {
        let mesh = TriangleMesh {
            vertices: vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, 1.0, 0.5),
            ],
            colors: vec![Vector3::new(1.0, 0.0, 0.5); 3],
            triangles: vec![[0, 1, 2]],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.ply");
        write_ply(&mesh, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ply");
        assert!(lines.contains(&"element vertex 3"));
        assert!(lines.contains(&"element face 1"));
        assert!(lines.contains(&"property uchar red"));
        assert!(lines.contains(&"0 1 0.5 255 0 128"));
        assert_eq!(*lines.last().unwrap(), "3 0 1 2");
    }

    #[test]
    fn test_write_empty_mesh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.ply");
        write_ply(&TriangleMesh::default(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("element vertex 0"));
        assert!(text.ends_with("end_header\n"));
    }
}
