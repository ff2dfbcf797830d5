//! Streaming serializers for fibre files.
//!
//! Two files per saved object: a primary stream of packed coordinate
//! records and a tab-delimited properties sidecar. [`Reader`]/[`Writer`]
//! handle a plain sequence of elements; [`SetReader`]/[`SetWriter`] nest
//! them to serialize a sequence of whole sets (e.g. posterior samples).

pub mod format;
pub mod reader;
pub mod set_reader;
pub mod set_writer;
pub mod sidecar;
pub mod writer;

pub use format::{
    Coding, ELEM_DEGREE_HINT, ELEM_VSIZE_HINT, NUM_ELEMS_HINT,
};
pub use reader::Reader;
pub use set_reader::SetReader;
pub use set_writer::SetWriter;
pub use writer::Writer;

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use glam::dvec3;
    use tempfile::tempdir;

    use super::*;
    use crate::core::{ElementData, Schema};
    use crate::geom::Strand;
    use crate::set::Set;
    use crate::util::Error;

    fn strand(degree: usize, seed: f64, acs: f64) -> ElementData {
        let rows: Vec<_> = (0..degree)
            .map(|i| dvec3(seed + i as f64, seed - i as f64, seed * 0.5))
            .collect();
        let mut e = ElementData::from_rows(&rows, Schema::new(["acs"]));
        e.set_prop_by_name("acs", acs).unwrap();
        e
    }

    fn sample_set() -> Set<Strand> {
        let mut set = Set::new(Schema::empty(), Schema::new(["acs"]));
        set.push_back(&strand(3, 1.0, 1.0)).unwrap();
        set.push_back(&strand(3, 2.0, 2.0)).unwrap();
        set.add_extend_elem_prop("bundle_index", "-1");
        set.set_extend_elem_prop("bundle_index", "5", 1).unwrap();
        set
    }

    fn assert_sets_close(a: &Set<Strand>, b: &Set<Strand>, tol: f64) {
        assert_eq!(a.size(), b.size());
        assert_eq!(a.num_props(), b.num_props());
        assert!(a.elem_schema().matches(b.elem_schema()));
        for i in 0..a.size() {
            assert_eq!(a.elem_degree(i), b.elem_degree(i));
            for (x, y) in a.elem(i).values().iter().zip(b.elem(i).values()) {
                assert!((x - y).abs() <= tol, "{x} != {y}");
            }
        }
    }

    #[test]
    fn test_round_trip_binary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("strands.frr");
        let set = sample_set();
        set.save(&path).unwrap();

        let loaded = Set::<Strand>::load(&path).unwrap();
        assert_sets_close(&set, &loaded, 0.0);
        assert!(loaded.is_uniform());
        assert_eq!(loaded.get_extend_elem_prop("bundle_index", 1).unwrap(), "5");
        assert_eq!(loaded.elem(0).prop_by_name("acs").unwrap(), 1.0);
        assert_eq!(loaded.elem(1).prop_by_name("acs").unwrap(), 2.0);
    }

    #[test]
    fn test_round_trip_frozen_uses_size_hints() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frozen.frr");
        let mut set = sample_set();
        set.freeze_elem_degree(false).unwrap();
        set.save(&path).unwrap();

        // The header of a uniform set records its shape.
        let mut reader = Reader::<Strand>::open(&path).unwrap();
        assert_eq!(
            reader.extend_props().get(NUM_ELEMS_HINT).map(String::as_str),
            Some("2")
        );
        let loaded = Set::load_from(&mut reader).unwrap();
        assert!(loaded.is_uniform());
        assert_sets_close(&set, &loaded, 0.0);
    }

    #[test]
    fn test_unclosed_writer_leaves_no_target() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aborted.frr");
        let mut writer = Writer::<Strand>::create(
            &path,
            Schema::new(["acs"]),
            Vec::new(),
            BTreeMap::new(),
            Coding::Binary(crate::util::DataType::default()),
        )
        .unwrap();
        writer.append(&strand(3, 1.0, 1.0), &BTreeMap::new()).unwrap();
        drop(writer);
        // Output is staged in a temp file and only renamed at close.
        assert!(!path.exists());
    }

    #[test]
    fn test_round_trip_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("strands.txt");
        let set = sample_set();
        set.save(&path).unwrap();

        let loaded = Set::<Strand>::load(&path).unwrap();
        assert_sets_close(&set, &loaded, 0.0);
    }

    #[test]
    fn test_round_trip_float32_loses_little() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("strands.frr");
        let set = sample_set();

        let mut file_props = BTreeMap::new();
        file_props.insert("comment".to_string(), "f32 stream".to_string());
        let mut writer = Writer::<Strand>::create(
            &path,
            set.elem_schema().clone(),
            set.extend_elem_prop_keys(),
            file_props,
            Coding::Binary(crate::util::DataType::Float32BE),
        )
        .unwrap();
        for i in 0..set.size() {
            let row = set.get_extend_elem_prop_row(i).unwrap();
            writer.append(&set.elem_data(i), &row).unwrap();
        }
        writer.close().unwrap();

        let loaded = Set::<Strand>::load(&path).unwrap();
        assert_sets_close(&set, &loaded, 1e-5);
        assert_eq!(
            loaded.extend_props().get("comment").map(String::as_str),
            Some("f32 stream")
        );
    }

    #[test]
    fn test_round_trip_variable_degree() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mixed.frr");
        let mut set: Set<Strand> = Set::new(Schema::empty(), Schema::new(["acs"]));
        set.push_back(&strand(2, 1.0, 0.1)).unwrap();
        set.push_back(&strand(5, 2.0, 0.2)).unwrap();
        set.push_back(&strand(3, 3.0, 0.3)).unwrap();
        set.save(&path).unwrap();

        let loaded = Set::<Strand>::load(&path).unwrap();
        assert!(!loaded.is_uniform());
        assert_sets_close(&set, &loaded, 0.0);
    }

    #[test]
    fn test_reader_rewind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("strands.frr");
        sample_set().save(&path).unwrap();

        let mut reader = Reader::<Strand>::open(&path).unwrap();
        let (first, _) = reader.next().unwrap().unwrap();
        while reader.next().unwrap().is_some() {}
        assert_eq!(reader.count(), 2);

        reader.rewind().unwrap();
        let (again, _) = reader.next().unwrap().unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_desync_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("strands.frr");
        sample_set().save(&path).unwrap();

        // Drop the last sidecar line: primary stream now runs ahead.
        let sidecar = dir.path().join("strands.frrx");
        let content = std::fs::read_to_string(&sidecar).unwrap();
        let shortened: Vec<&str> = content.lines().collect();
        std::fs::write(&sidecar, shortened[..shortened.len() - 1].join("\n") + "\n").unwrap();

        let mut reader = Reader::<Strand>::open(&path).unwrap();
        assert!(reader.next().is_ok());
        assert!(matches!(reader.next(), Err(Error::Desync(_))));
    }

    #[test]
    fn test_footer_count_validated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("strands.txt");
        sample_set().save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let patched = content.replace("count: 2", "count: 7");
        std::fs::write(&path, patched).unwrap();

        let mut reader = Reader::<Strand>::open(&path).unwrap();
        let mut result = reader.next();
        while matches!(result, Ok(Some(_))) {
            result = reader.next();
        }
        assert!(matches!(result, Err(Error::FileFormat(_))));
    }

    #[test]
    fn test_property_row_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("strands.frr");
        let mut writer = Writer::<Strand>::create(
            &path,
            Schema::new(["acs"]),
            vec!["bundle_index".to_string()],
            BTreeMap::new(),
            Coding::Binary(crate::util::DataType::default()),
        )
        .unwrap();
        let empty = BTreeMap::new();
        assert!(matches!(
            writer.append(&strand(2, 0.0, 1.0), &empty),
            Err(Error::PropertyRowMismatch(_))
        ));
    }

    #[test]
    fn test_set_stream_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("samples.frr");

        let mut first = sample_set();
        first.add_prop("base_intensity", 0.75);
        first.set_extend_prop("iteration", "0");
        let mut second = sample_set();
        second.add_prop("base_intensity", 1.25);
        second.set_extend_prop("iteration", "1");
        second.erase(0).unwrap();

        let mut writer = SetWriter::<Strand>::create(
            &path,
            first.schema().clone(),
            first.elem_schema().clone(),
            vec!["iteration".to_string()],
            first.extend_elem_prop_keys(),
            BTreeMap::new(),
            Coding::Binary(crate::util::DataType::default()),
        )
        .unwrap();
        writer.append(&first).unwrap();
        writer.append(&second).unwrap();
        assert_eq!(writer.count(), 2);
        writer.close().unwrap();

        let mut reader = SetReader::<Strand>::open(&path).unwrap();
        let a = reader.next().unwrap().unwrap();
        assert_eq!(a.size(), 2);
        assert_eq!(a.prop_by_name("base_intensity").unwrap(), 0.75);
        assert_eq!(a.get_extend_prop("iteration").unwrap(), "0");
        assert_eq!(a.get_extend_elem_prop("bundle_index", 1).unwrap(), "5");
        assert_eq!(a.elem(1).prop_by_name("acs").unwrap(), 2.0);

        let b = reader.next().unwrap().unwrap();
        assert_eq!(b.size(), 1);
        assert_eq!(b.prop_by_name("base_intensity").unwrap(), 1.25);
        assert_eq!(b.get_extend_prop("iteration").unwrap(), "1");

        assert!(reader.next().unwrap().is_none());

        reader.rewind().unwrap();
        let again = reader.next().unwrap().unwrap();
        assert_eq!(again.size(), 2);
    }

    #[test]
    fn test_missing_set_separator_line_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("samples.frr");
        let set = sample_set();

        let mut writer = SetWriter::<Strand>::create(
            &path,
            set.schema().clone(),
            set.elem_schema().clone(),
            Vec::new(),
            set.extend_elem_prop_keys(),
            BTreeMap::new(),
            Coding::Binary(crate::util::DataType::default()),
        )
        .unwrap();
        writer.append(&set).unwrap();
        writer.close().unwrap();

        // Cut the "--- END 1 ---" separator from the element sidecar.
        let elem_sidecar = dir.path().join("samples.frrxx");
        let content = std::fs::read_to_string(&elem_sidecar).unwrap();
        let without: String = content
            .lines()
            .filter(|line| !line.starts_with("--- END"))
            .collect::<Vec<_>>()
            .join("\n");
        std::fs::write(&elem_sidecar, without).unwrap();

        let mut reader = SetReader::<Strand>::open(&path).unwrap();
        assert!(reader.next().is_err());
    }

    #[test]
    fn test_concrete_acs_scenario() {
        // Build a set of 3-degree strands with one scalar property `acs`,
        // push two elements with acs 1.0 and 2.0, save and reload.
        let dir = tempdir().unwrap();
        let path = dir.path().join("acs.frr");

        let mut set: Set<Strand> = Set::new(Schema::empty(), Schema::new(["acs"]));
        let mut first = strand(3, 0.0, 0.0);
        first.set_prop_by_name("acs", 1.0).unwrap();
        let mut second = strand(3, 10.0, 0.0);
        second.set_prop_by_name("acs", 2.0).unwrap();
        set.push_back(&first).unwrap();
        set.push_back(&second).unwrap();
        set.save(&path).unwrap();

        let loaded = Set::<Strand>::load(&path).unwrap();
        assert_eq!(loaded.size(), 2);
        assert_eq!(loaded.elem(0).prop_by_name("acs").unwrap(), 1.0);
        assert_eq!(loaded.elem(1).prop_by_name("acs").unwrap(), 2.0);
        assert_eq!(loaded.elem_degree(0), 3);
        assert_eq!(loaded.elem_degree(1), 3);
    }
}
