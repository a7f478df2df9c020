use anyhow::Result;
use std::rc::Rc;
use tracing::debug;

use crate::data::{FeatureCollection, FeatureProperties, Properties};

/// Which layout the first feature's properties had
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// One record per feature
    Flat,
    /// The first feature's properties are a list of records
    RecordList,
    /// Each feature's properties hold a nested feature collection
    NestedCollection,
}

/// Everything the selectors and charts need from a feature collection
#[derive(Debug, Clone)]
pub struct Extraction {
    pub shape: Shape,
    /// Attribute names, case-insensitively sorted
    pub attributes: Vec<String>,
    /// Attributes whose sample value reads as a finite number
    pub numeric_attributes: Vec<String>,
    /// Normalized property list fed to aggregation
    pub records: Rc<[Properties]>,
}

impl Extraction {
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }
}

/// Parse an embedded payload and extract attributes in one go.
///
/// `Ok(None)` means the collection has no features.
pub fn extract_from_payload(text: &str) -> Result<Option<Extraction>> {
    let collection = FeatureCollection::parse(text)?;
    Ok(extract(&collection))
}

/// Resolve shape against the first feature and build the property list.
pub fn extract(collection: &FeatureCollection) -> Option<Extraction> {
    let first = collection.features.first()?;

    let (shape, records, sample): (Shape, Vec<Properties>, Option<Properties>) =
        match &first.properties {
            FeatureProperties::RecordList(list) => {
                (Shape::RecordList, list.clone(), list.first().cloned())
            }
            FeatureProperties::NestedCollection(nested) => {
                let records: Vec<Properties> = collection
                    .features
                    .iter()
                    .flat_map(|f| match &f.properties {
                        FeatureProperties::NestedCollection(n) => n.clone(),
                        _ => Vec::new(),
                    })
                    .collect();
                (Shape::NestedCollection, records, nested.first().cloned())
            }
            FeatureProperties::Record(record) => {
                let records = collection
                    .features
                    .iter()
                    .map(|f| match &f.properties {
                        FeatureProperties::Record(r) => r.clone(),
                        _ => Properties::new(),
                    })
                    .collect();
                (Shape::Flat, records, Some(record.clone()))
            }
        };

    let sample = sample.unwrap_or_default();
    let attributes = sort_attributes(sample.keys().cloned().collect());
    let numeric_attributes = numeric_attributes(&sample);

    debug!(
        ?shape,
        attributes = attributes.len(),
        records = records.len(),
        "extracted attributes"
    );

    Some(Extraction {
        shape,
        attributes,
        numeric_attributes,
        records: records.into(),
    })
}

/// Case-insensitive ordering; exact text breaks ties so the order is total.
pub fn sort_attributes(mut names: Vec<String>) -> Vec<String> {
    names.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
    names
}

/// Keys of `sample` whose value parses as a finite number, sorted on their own.
pub fn numeric_attributes(sample: &Properties) -> Vec<String> {
    let names = sample
        .iter()
        .filter(|(_, v)| v.as_number().is_some())
        .map(|(k, _)| k.clone())
        .collect();
    sort_attributes(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PropertyValue;

    fn payload(s: &str) -> Extraction {
        extract_from_payload(s).unwrap().unwrap()
    }

    #[test]
    fn test_single_feature_keys() {
        let ex = payload(r#"{"features":[{"properties":{"b":"x","a":1}}]}"#);
        assert_eq!(ex.shape, Shape::Flat);
        assert_eq!(ex.attributes, vec!["a", "b"]);
        assert_eq!(ex.numeric_attributes, vec!["a"]);
        assert_eq!(ex.records.len(), 1);
    }

    #[test]
    fn test_case_insensitive_sort() {
        let ex = payload(r#"{"features":[{"properties":{"Zone":1,"area":2,"Beta":3,"alpha":4}}]}"#);
        assert_eq!(ex.attributes, vec!["alpha", "area", "Beta", "Zone"]);
    }

    #[test]
    fn test_numeric_strings_count_as_numeric() {
        let ex = payload(
            r#"{"features":[{"properties":{"pop":"1200","name":"X","ratio":"0.5%","flag":true,"none":null}}]}"#,
        );
        assert_eq!(ex.numeric_attributes, vec!["pop", "ratio"]);
    }

    #[test]
    fn test_empty_collection_is_none() {
        assert!(extract_from_payload(r#"{"features":[]}"#).unwrap().is_none());
        assert!(extract_from_payload(r#"{}"#).unwrap().is_none());
    }

    #[test]
    fn test_malformed_payload_is_error() {
        assert!(extract_from_payload("<html>").is_err());
    }

    #[test]
    fn test_record_list_shape() {
        let ex = payload(
            r#"{"features":[
                {"properties":[{"kind":"well","depth":10},{"kind":"pump","depth":4}]},
                {"properties":[{"kind":"ignored"}]}
            ]}"#,
        );
        assert_eq!(ex.shape, Shape::RecordList);
        assert_eq!(ex.attributes, vec!["depth", "kind"]);
        // only the first feature's list is used
        assert_eq!(ex.records.len(), 2);
    }

    #[test]
    fn test_record_list_empty() {
        let ex = payload(r#"{"features":[{"properties":[]}]}"#);
        assert!(ex.attributes.is_empty());
        assert!(ex.records.is_empty());
    }

    #[test]
    fn test_nested_collection_flattens_all_features() {
        let ex = payload(
            r#"{"features":[
                {"properties":{"features":[{"properties":{"use":"farm"}},{"properties":{"use":"forest"}}]}},
                {"properties":{"features":[{"properties":{"use":"farm"}}]}}
            ]}"#,
        );
        assert_eq!(ex.shape, Shape::NestedCollection);
        assert_eq!(ex.attributes, vec!["use"]);
        assert_eq!(ex.records.len(), 3);
        assert_eq!(
            ex.records[2].get("use"),
            Some(&PropertyValue::Text("farm".to_string()))
        );
    }

    #[test]
    fn test_has_attribute() {
        let ex = payload(r#"{"features":[{"properties":{"a":1}}]}"#);
        assert!(ex.has_attribute("a"));
        assert!(!ex.has_attribute("b"));
    }
}
