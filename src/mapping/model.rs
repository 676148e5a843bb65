//! Raw mapping document and its validation into [`Mapping`].

use serde::Deserialize;
use serde_yaml_ng::{Mapping as YamlMapping, Value as YamlValue};
use std::collections::HashSet;

use super::format::compile_formats;
use super::{ColumnSpec, ColumnType, DateFormat, Mapping, ObjectKind, ObjectModel, SourceSpec};
use crate::error::{LoaderError, Result};

#[derive(Debug, Deserialize)]
struct RawMapping {
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    source_url_column: Option<String>,
    #[serde(default)]
    entities: Option<YamlMapping>,
    #[serde(default)]
    relations: Option<YamlMapping>,
    #[serde(default)]
    columns: Vec<RawColumn>,
}

#[derive(Debug, Deserialize)]
struct RawObject {
    #[serde(default, alias = "schemata")]
    schema: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    source_url_column: Option<String>,
    #[serde(default)]
    columns: Vec<RawColumn>,
}

#[derive(Debug, Deserialize)]
struct RawColumn {
    #[serde(default)]
    object: Option<String>,
    #[serde(default)]
    column: Option<String>,
    #[serde(default)]
    property: Option<String>,
    #[serde(default, rename = "type")]
    data_type: Option<String>,
    #[serde(default)]
    format: Option<YamlValue>,
    #[serde(default)]
    default: Option<YamlValue>,
    #[serde(default)]
    required: Option<bool>,
    #[serde(default)]
    skip_empty: Option<bool>,
    #[serde(default)]
    unique: Option<bool>,
    #[serde(default)]
    unique_active: Option<bool>,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    source_url_column: Option<String>,
}

/// Columns are optional unless marked `required`, and absent values are
/// dropped unless `skip_empty: false`.
const DEFAULT_REQUIRED: bool = false;
const DEFAULT_SKIP_EMPTY: bool = true;

/// Property bound implicitly as an identity key.
const NAME_PROPERTY: &str = "name";

pub(super) fn compile(doc: YamlValue) -> Result<Mapping> {
    if doc.is_null() {
        return Err(LoaderError::schema("mapping document is empty"));
    }
    let raw: RawMapping = serde_yaml_ng::from_value(doc)
        .map_err(|e| LoaderError::schema(format!("malformed mapping: {}", e)))?;

    let mut seen = HashSet::new();
    let mut entities = Vec::new();
    let mut relations = Vec::new();

    for (name, raw_obj) in named_objects(raw.entities, "entity")? {
        if raw_obj.source.is_some() || raw_obj.target.is_some() {
            return Err(LoaderError::schema(format!(
                "entity {} must not declare source or target",
                name
            )));
        }
        claim_name(&mut seen, &name)?;
        entities.push(compile_object(name, raw_obj, ObjectKind::Entity)?);
    }

    for (name, mut raw_obj) in named_objects(raw.relations, "relation")? {
        let (source, target) = match (raw_obj.source.take(), raw_obj.target.take()) {
            (Some(source), Some(target)) => (source, target),
            _ => {
                return Err(LoaderError::schema(format!(
                    "relation {} needs both source and target",
                    name
                )))
            }
        };
        for endpoint in [&source, &target] {
            if !entities.iter().any(|e: &ObjectModel| &e.name == endpoint) {
                return Err(LoaderError::schema(format!(
                    "relation {} refers to unknown entity {}",
                    name, endpoint
                )));
            }
        }
        claim_name(&mut seen, &name)?;
        relations.push(compile_object(name, raw_obj, ObjectKind::Relation { source, target })?);
    }

    for raw_col in raw.columns {
        let owner = raw_col.object.clone().ok_or_else(|| {
            LoaderError::schema(format!(
                "column {} does not name its object",
                raw_col.column.as_deref().unwrap_or("<unnamed>")
            ))
        })?;
        let target = entities
            .iter_mut()
            .chain(relations.iter_mut())
            .find(|o| o.name == owner)
            .ok_or_else(|| {
                LoaderError::schema(format!("column refers to unknown object {}", owner))
            })?;
        let spec = compile_column(&owner, raw_col)?;
        target.columns.push(spec);
    }

    log::debug!(
        "Compiled mapping: {} entities, {} relations",
        entities.len(),
        relations.len()
    );

    Ok(Mapping {
        source: SourceSpec {
            source_url: raw.source_url,
            source_url_column: raw.source_url_column,
        },
        entities,
        relations,
    })
}

fn named_objects(map: Option<YamlMapping>, what: &str) -> Result<Vec<(String, RawObject)>> {
    let mut out = Vec::new();
    for (key, value) in map.unwrap_or_default() {
        let name = match key {
            YamlValue::String(s) => s,
            other => {
                return Err(LoaderError::schema(format!(
                    "{} names must be strings, got {:?}",
                    what, other
                )))
            }
        };
        let raw: RawObject = serde_yaml_ng::from_value(value)
            .map_err(|e| LoaderError::schema(format!("{} {}: {}", what, name, e)))?;
        out.push((name, raw));
    }
    Ok(out)
}

fn claim_name(seen: &mut HashSet<String>, name: &str) -> Result<()> {
    if !seen.insert(name.to_string()) {
        return Err(LoaderError::schema(format!(
            "object name {} is declared twice",
            name
        )));
    }
    Ok(())
}

fn compile_object(name: String, raw: RawObject, kind: ObjectKind) -> Result<ObjectModel> {
    let schema = raw
        .schema
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| LoaderError::schema(format!("object {} has no schema", name)))?;

    let mut columns = Vec::with_capacity(raw.columns.len());
    for raw_col in raw.columns {
        if let Some(owner) = &raw_col.object {
            if owner != &name {
                return Err(LoaderError::schema(format!(
                    "column nested under {} claims object {}",
                    name, owner
                )));
            }
        }
        columns.push(compile_column(&name, raw_col)?);
    }

    Ok(ObjectModel {
        name,
        schema,
        kind,
        source: SourceSpec {
            source_url: raw.source_url,
            source_url_column: raw.source_url_column,
        },
        columns,
    })
}

fn compile_column(owner: &str, raw: RawColumn) -> Result<ColumnSpec> {
    let property = raw
        .property
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| {
            LoaderError::schema(format!(
                "column {} of {} has no property",
                raw.column.as_deref().unwrap_or("<unnamed>"),
                owner
            ))
        })?;
    let label = raw.column.clone().unwrap_or_else(|| property.clone());

    let column_type = parse_type(raw.data_type.as_deref(), raw.format.as_ref(), &label)?;
    let default = raw
        .default
        .as_ref()
        .map(|v| default_text(v, &label))
        .transpose()?
        .flatten();

    let unique = raw.unique.unwrap_or(property == NAME_PROPERTY);

    Ok(ColumnSpec {
        object: owner.to_string(),
        column: raw.column,
        property,
        column_type,
        default,
        required: raw.required.unwrap_or(DEFAULT_REQUIRED),
        skip_empty: raw.skip_empty.unwrap_or(DEFAULT_SKIP_EMPTY),
        unique,
        unique_active: raw.unique_active.unwrap_or(false),
        source: SourceSpec {
            source_url: raw.source_url,
            source_url_column: raw.source_url_column,
        },
    })
}

fn parse_type(name: Option<&str>, format: Option<&YamlValue>, column: &str) -> Result<ColumnType> {
    let name = name.map(|n| n.trim().to_lowercase());
    let column_type = match name.as_deref() {
        None | Some("string") | Some("str") | Some("text") => ColumnType::String,
        Some("bool") | Some("boolean") => ColumnType::Bool,
        Some("int") | Some("integer") => ColumnType::Int,
        Some("float") | Some("decimal") | Some("real") => ColumnType::Float,
        Some("date") | Some("datetime") | Some("timestamp") => match format {
            Some(spec) => ColumnType::Date(DateFormat::Candidates(compile_formats(spec, column)?)),
            None => ColumnType::Date(DateFormat::Natural),
        },
        Some("file") => ColumnType::File,
        Some(other) => {
            log::warn!("column {}: unknown type {}, loading raw text", column, other);
            ColumnType::String
        }
    };
    if format.is_some() && !matches!(column_type, ColumnType::Date(_)) {
        log::warn!("column {}: format is ignored for non-date types", column);
    }
    Ok(column_type)
}

fn default_text(value: &YamlValue, column: &str) -> Result<Option<String>> {
    match value {
        YamlValue::Null => Ok(None),
        YamlValue::String(s) => Ok(Some(s.clone())),
        YamlValue::Bool(b) => Ok(Some(b.to_string())),
        YamlValue::Number(n) => Ok(Some(n.to_string())),
        YamlValue::Tagged(tagged) => default_text(&tagged.value, column),
        other => Err(LoaderError::schema(format!(
            "column {}: default must be a scalar, got {:?}",
            column, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DatePrecision;

    fn compile_str(text: &str) -> Result<Mapping> {
        Mapping::from_yaml_str(text)
    }

    const PEOPLE: &str = r#"
source_url: http://example.org/people.csv
entities:
  person:
    schema: Person
  company:
    schemata: Company
    source_url_column: Link
relations:
  employment:
    schema: Employment
    source: person
    target: company
columns:
  - object: person
    column: Name
    property: name
    required: true
  - object: company
    column: Company
    property: name
  - object: employment
    column: Since
    property: date_start
    type: date
    format:
      year: "%Y"
      day: "%Y-%m-%d"
"#;

    #[test]
    fn test_compile_keeps_declaration_order() {
        let m = compile_str(PEOPLE).unwrap();
        let names: Vec<_> = m.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["person", "company"]);
        assert_eq!(m.relations[0].name, "employment");
        assert_eq!(
            m.relations[0].kind,
            ObjectKind::Relation {
                source: "person".to_string(),
                target: "company".to_string()
            }
        );
        assert_eq!(m.source.source_url.as_deref(), Some("http://example.org/people.csv"));
    }

    #[test]
    fn test_schemata_alias_and_object_source() {
        let m = compile_str(PEOPLE).unwrap();
        let company = m.object("company").unwrap();
        assert_eq!(company.schema, "Company");
        assert_eq!(company.source.source_url_column.as_deref(), Some("Link"));
    }

    #[test]
    fn test_column_defaults() {
        let m = compile_str(PEOPLE).unwrap();
        let company_name = &m.object("company").unwrap().columns[0];
        assert!(!company_name.required);
        assert!(company_name.skip_empty);
        assert!(company_name.unique, "name is unique by convention");
        assert!(!company_name.unique_active);
        assert_eq!(company_name.column_type, ColumnType::String);
    }

    #[test]
    fn test_name_uniqueness_can_be_overridden() {
        let m = compile_str(
            r#"
entities:
  person: {schema: Person}
columns:
  - {object: person, column: Name, property: name, unique: false}
  - {object: person, column: Id, property: ref, unique: true, unique_active: true}
"#,
        )
        .unwrap();
        let cols = &m.entities[0].columns;
        assert!(!cols[0].unique);
        assert!(cols[1].unique);
        assert!(cols[1].unique_active);
    }

    #[test]
    fn test_date_candidates_compiled_once() {
        let m = compile_str(PEOPLE).unwrap();
        let since = &m.relations[0].columns[0];
        match &since.column_type {
            ColumnType::Date(DateFormat::Candidates(c)) => {
                assert_eq!(c[0].precision, DatePrecision::Day);
                assert_eq!(c[1].precision, DatePrecision::Year);
            }
            other => panic!("unexpected type {:?}", other),
        }
    }

    #[test]
    fn test_nested_columns() {
        let m = compile_str(
            r#"
entities:
  person:
    schema: Person
    columns:
      - {column: Name, property: name}
      - {column: Age, property: age, type: Integer, default: 0}
"#,
        )
        .unwrap();
        let cols = &m.entities[0].columns;
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[1].object, "person");
        assert_eq!(cols[1].column_type, ColumnType::Int);
        assert_eq!(cols[1].default.as_deref(), Some("0"));
    }

    #[test]
    fn test_type_aliases() {
        for (name, expected) in [
            ("boolean", ColumnType::Bool),
            ("REAL", ColumnType::Float),
            (" text ", ColumnType::String),
            ("timestamp", ColumnType::Date(DateFormat::Natural)),
            ("file", ColumnType::File),
            ("url", ColumnType::String),
            ("blob", ColumnType::String),
        ] {
            let doc = format!(
                "entities: {{e: {{schema: E}}}}\ncolumns:\n  - {{object: e, column: C, property: p, type: '{}'}}\n",
                name
            );
            let m = compile_str(&doc).unwrap();
            assert_eq!(m.entities[0].columns[0].column_type, expected, "type {}", name);
        }
    }

    #[test]
    fn test_unknown_type_loads_raw_text() {
        let m = compile_str(
            "entities: {e: {schema: E}}\ncolumns: [{object: e, column: Link, property: url, type: url}]",
        )
        .unwrap();
        let col = &m.entities[0].columns[0];
        assert_eq!(col.column_type, ColumnType::String);
        assert_eq!(col.column.as_deref(), Some("Link"));
    }

    #[test]
    fn test_schema_errors() {
        let cases = [
            "",
            "entities: {e: {}}",
            "entities: {e: {schema: E}}\ncolumns: [{object: x, column: C, property: p}]",
            "entities: {e: {schema: E}}\ncolumns: [{column: C, property: p}]",
            "entities: {e: {schema: E}}\ncolumns: [{object: e, column: C}]",
            "entities: {e: {schema: E}}\ncolumns: [{object: e, column: C, property: p, type: date, format: 5}]",
            "entities: {e: {schema: E}}\ncolumns: [{object: e, column: C, property: p, default: [1]}]",
            "entities: {e: {schema: E}}\nrelations: {r: {schema: R, source: e}}",
            "entities: {e: {schema: E}}\nrelations: {r: {schema: R, source: e, target: nobody}}",
            "entities: {e: {schema: E}}\nrelations: {e: {schema: R, source: e, target: e}}",
        ];
        for doc in cases {
            let err = compile_str(doc).unwrap_err();
            assert!(matches!(err, LoaderError::Schema(_)), "{:?} gave {:?}", doc, err);
        }
    }
}
