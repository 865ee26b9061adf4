//! `modelDescription.xml` consumption: GUID, the scalar variable list and
//! their attributes, and the vendor-annotation fields that steer worker
//! launch (executable URI, entry-point URI, pre/main/post argument
//! strings, additional input files). Parsed with `quick-xml`.

use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use rdv_common::{Causality, ValueRef, Variability};
use rdv_directory::{StartValue, VariableSpec};

#[derive(Debug, thiserror::Error)]
pub enum ModelDescriptionError {
    #[error("failed to read model description at {0}: {1}")]
    Io(String, #[source] std::io::Error),

    #[error("malformed XML in model description: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed XML attribute in model description: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    #[error("model description is missing required attribute 'guid'")]
    MissingGuid,

    #[error("scalar variable '{0}' is missing a value type element (Real/Integer/Boolean/String)")]
    MissingValueType(String),

    #[error("scalar variable '{0}' has an unparseable valueReference")]
    BadValueReference(String),

    #[error("scalar variable '{0}' has an unrecognized causality '{1}'")]
    BadCausality(String, String),

    #[error("scalar variable '{0}' has an unrecognized variability '{1}'")]
    BadVariability(String, String),
}

/// Vendor annotations that steer worker launch.
#[derive(Debug, Clone, Default)]
pub struct VendorAnnotations {
    pub executable_uri: Option<String>,
    pub entry_point_uri: Option<String>,
    pub pre_arguments: Option<String>,
    pub main_arguments: Option<String>,
    pub post_arguments: Option<String>,
    /// Additional files (relative to the FMU location) to copy into the
    /// worker's working directory before launch.
    pub additional_input_files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ModelDescription {
    pub guid: String,
    pub variables: Vec<VariableSpec>,
    pub vendor: VendorAnnotations,
}

impl ModelDescription {
    pub fn parse_file(path: &Path) -> Result<Self, ModelDescriptionError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ModelDescriptionError::Io(path.display().to_string(), e))?;
        Self::parse_str(&text)
    }

    pub fn parse_str(xml: &str) -> Result<Self, ModelDescriptionError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut guid: Option<String> = None;
        let mut variables = Vec::new();
        let mut vendor = VendorAnnotations::default();

        // Transient state for the element currently being parsed.
        let mut current_var: Option<PartialVariable> = None;
        let mut in_vendor_annotations = false;
        let mut pending_annotation_name: Option<String> = None;
        let mut text_buf = String::new();

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Eof => break,
                Event::Start(e) | Event::Empty(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    match name.as_str() {
                        "fmiModelDescription" => {
                            for attr in e.attributes() {
                                let attr = attr?;
                                if attr.key.as_ref() == b"guid" {
                                    guid = Some(attr.unescape_value()?.into_owned());
                                }
                            }
                        }
                        "VendorAnnotations" => in_vendor_annotations = true,
                        "Annotation" if in_vendor_annotations => {
                            for attr in e.attributes() {
                                let attr = attr?;
                                if attr.key.as_ref() == b"name" {
                                    pending_annotation_name = Some(attr.unescape_value()?.into_owned());
                                }
                            }
                        }
                        "AdditionalInputFile" if in_vendor_annotations => {
                            for attr in e.attributes() {
                                let attr = attr?;
                                if attr.key.as_ref() == b"path" {
                                    vendor
                                        .additional_input_files
                                        .push(attr.unescape_value()?.into_owned());
                                }
                            }
                        }
                        "ScalarVariable" => {
                            let mut pv = PartialVariable::default();
                            for attr in e.attributes() {
                                let attr = attr?;
                                let value = attr.unescape_value()?.into_owned();
                                match attr.key.as_ref() {
                                    b"name" => pv.name = value,
                                    b"valueReference" => pv.value_reference = Some(value),
                                    b"causality" => pv.causality = Some(value),
                                    b"variability" => pv.variability = Some(value),
                                    _ => {}
                                }
                            }
                            current_var = Some(pv);
                        }
                        "Real" | "Integer" | "Boolean" | "String" => {
                            if let Some(pv) = current_var.as_mut() {
                                pv.value_type = Some(name.clone());
                                for attr in e.attributes() {
                                    let attr = attr?;
                                    if attr.key.as_ref() == b"start" {
                                        pv.start = Some(attr.unescape_value()?.into_owned());
                                    }
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Event::Text(t) => {
                    text_buf = t.unescape()?.into_owned();
                }
                Event::End(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    match name.as_str() {
                        "VendorAnnotations" => in_vendor_annotations = false,
                        "Annotation" => {
                            if let Some(key) = pending_annotation_name.take() {
                                apply_annotation(&mut vendor, &key, text_buf.trim());
                            }
                        }
                        "ScalarVariable" => {
                            if let Some(pv) = current_var.take() {
                                variables.push(pv.finish()?);
                            }
                        }
                        _ => {}
                    }
                    text_buf.clear();
                }
                _ => {}
            }
        }

        Ok(ModelDescription {
            guid: guid.ok_or(ModelDescriptionError::MissingGuid)?,
            variables,
            vendor,
        })
    }
}

fn apply_annotation(vendor: &mut VendorAnnotations, key: &str, value: &str) {
    match key {
        "executableUri" => vendor.executable_uri = Some(value.to_string()),
        "entryPointUri" => vendor.entry_point_uri = Some(value.to_string()),
        "preArguments" => vendor.pre_arguments = Some(value.to_string()),
        "mainArguments" => vendor.main_arguments = Some(value.to_string()),
        "postArguments" => vendor.post_arguments = Some(value.to_string()),
        _ => {}
    }
}

#[derive(Default)]
struct PartialVariable {
    name: String,
    value_reference: Option<String>,
    causality: Option<String>,
    variability: Option<String>,
    value_type: Option<String>,
    start: Option<String>,
}

impl PartialVariable {
    fn finish(self) -> Result<VariableSpec, ModelDescriptionError> {
        let handle = self
            .value_reference
            .as_deref()
            .unwrap_or("")
            .parse::<u32>()
            .map_err(|_| ModelDescriptionError::BadValueReference(self.name.clone()))?;

        let causality = parse_causality(&self.name, self.causality.as_deref().unwrap_or("local"))?;
        let variability =
            parse_variability(&self.name, self.variability.as_deref().unwrap_or("continuous"))?;

        let value_type = self
            .value_type
            .as_deref()
            .ok_or_else(|| ModelDescriptionError::MissingValueType(self.name.clone()))?;

        let start = match value_type {
            "Real" => StartValue::Real(self.start.as_deref().unwrap_or("0").parse().unwrap_or(0.0)),
            "Integer" => StartValue::Integer(self.start.as_deref().unwrap_or("0").parse().unwrap_or(0)),
            "Boolean" => StartValue::Boolean(self.start.as_deref().unwrap_or("false") == "true"),
            "String" => StartValue::String(self.start.unwrap_or_default()),
            _ => return Err(ModelDescriptionError::MissingValueType(self.name)),
        };

        Ok(VariableSpec::new(self.name, ValueRef(handle), causality, variability, start))
    }
}

fn parse_causality(var_name: &str, raw: &str) -> Result<Causality, ModelDescriptionError> {
    Ok(match raw {
        "input" => Causality::Input,
        "output" => Causality::Output,
        "parameter" => Causality::Parameter,
        "calculatedParameter" => Causality::CalculatedParameter,
        "local" => Causality::Local,
        "independent" => Causality::Independent,
        "internal" => Causality::Internal,
        "none" => Causality::None,
        other => return Err(ModelDescriptionError::BadCausality(var_name.to_string(), other.to_string())),
    })
}

fn parse_variability(var_name: &str, raw: &str) -> Result<Variability, ModelDescriptionError> {
    Ok(match raw {
        "constant" => Variability::Constant,
        "discrete" => Variability::Discrete,
        "continuous" => Variability::Continuous,
        "parameter" => Variability::Parameter,
        "fixed" => Variability::Fixed,
        "tunable" => Variability::Tunable,
        other => return Err(ModelDescriptionError::BadVariability(var_name.to_string(), other.to_string())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <fmiModelDescription guid="{abc-123}">
          <VendorAnnotations>
            <Tool name="rendezvous">
              <Annotation name="executableUri">fmu://bin/worker</Annotation>
              <Annotation name="mainArguments">--headless</Annotation>
              <AdditionalInputFile path="resources/lookup.csv"/>
            </Tool>
          </VendorAnnotations>
          <ModelVariables>
            <ScalarVariable name="u" valueReference="1" causality="input" variability="continuous">
              <Real start="0.0"/>
            </ScalarVariable>
            <ScalarVariable name="y" valueReference="2" causality="output" variability="continuous">
              <Real start="0.0"/>
            </ScalarVariable>
            <ScalarVariable name="count" valueReference="3" causality="parameter" variability="fixed">
              <Integer start="7"/>
            </ScalarVariable>
          </ModelVariables>
        </fmiModelDescription>
    "#;

    #[test]
    fn parses_guid_and_variables() {
        let md = ModelDescription::parse_str(SAMPLE).unwrap();
        assert_eq!(md.guid, "{abc-123}");
        assert_eq!(md.variables.len(), 3);
        assert_eq!(md.variables[0].name, "u");
        assert_eq!(md.variables[0].causality, Causality::Input);
        assert_eq!(md.variables[2].start, StartValue::Integer(7));
    }

    #[test]
    fn parses_vendor_annotations() {
        let md = ModelDescription::parse_str(SAMPLE).unwrap();
        assert_eq!(md.vendor.executable_uri.as_deref(), Some("fmu://bin/worker"));
        assert_eq!(md.vendor.main_arguments.as_deref(), Some("--headless"));
        assert_eq!(md.vendor.additional_input_files, vec!["resources/lookup.csv".to_string()]);
    }

    #[test]
    fn missing_guid_is_an_error() {
        let err = ModelDescription::parse_str("<fmiModelDescription></fmiModelDescription>").unwrap_err();
        assert!(matches!(err, ModelDescriptionError::MissingGuid));
    }
}
