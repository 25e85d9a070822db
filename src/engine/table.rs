//! Row model of the local engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locus {
    pub contig: String,
    pub position: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantRow {
    pub locus: Option<Locus>,
    #[serde(default)]
    pub alleles: Vec<String>,
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub filters: Option<Vec<String>>,
    #[serde(default)]
    pub locus_old: Option<Locus>,
    #[serde(default)]
    pub alleles_old: Option<Vec<String>>,
    #[serde(default)]
    pub a_index: Option<usize>,
    /// One call per sample column, `None` when missing
    #[serde(default)]
    pub genotypes: Vec<Option<String>>,
    #[serde(default)]
    pub annotations: Map<String, Value>,
}

impl VariantRow {
    pub fn key(&self, fields: &[String]) -> String {
        fields
            .iter()
            .map(|field| match field.as_str() {
                "locus" => self
                    .locus
                    .as_ref()
                    .map(|l| format!("{}:{}", l.contig, l.position))
                    .unwrap_or_default(),
                "alleles" => self.alleles.join(","),
                "variant_id" => self.variant_id.clone().unwrap_or_default(),
                other => self
                    .annotations
                    .get(other)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            })
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Document id in `contig-pos-ref-alt` form, or the variant id for interval rows.
    pub fn document_id(&self) -> String {
        match (&self.locus, self.alleles.as_slice()) {
            (Some(locus), [reference, alternate, ..]) => format!(
                "{}-{}-{}-{}",
                locus.contig.trim_start_matches("chr"),
                locus.position,
                reference,
                alternate
            ),
            _ => self.variant_id.clone().unwrap_or_default(),
        }
    }

    pub fn has_non_ref_call(&self) -> bool {
        self.genotypes
            .iter()
            .flatten()
            .any(|gt| is_non_ref(gt))
    }
}

/// Whether a `0/1`-style call carries any non-reference allele.
pub fn is_non_ref(genotype: &str) -> bool {
    genotype
        .split(['/', '|'])
        .filter_map(|allele| allele.parse::<usize>().ok())
        .any(|allele| allele > 0)
}

/// Re-express a call against a single split-out alternate allele.
fn downcode(genotype: &str, a_index: usize) -> String {
    let phased = genotype.contains('|');
    let alleles: Vec<String> = genotype
        .split(['/', '|'])
        .map(|allele| match allele.parse::<usize>() {
            Ok(i) if i == a_index => "1".to_string(),
            Ok(_) => "0".to_string(),
            Err(_) => allele.to_string(),
        })
        .collect();
    alleles.join(if phased { "|" } else { "/" })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantTable {
    pub key_fields: Vec<String>,
    pub samples: Vec<String>,
    pub rows: Vec<VariantRow>,
    #[serde(default)]
    pub globals: Map<String, Value>,
}

impl VariantTable {
    pub fn contig_counts(&self) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            if let Some(locus) = &row.locus {
                *counts.entry(locus.contig.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn split_multi(&self) -> VariantTable {
        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let alternates = row.alleles.len().saturating_sub(1).max(1);
            for a_index in 1..=alternates {
                let mut split = row.clone();
                split.locus_old = row.locus.clone();
                split.alleles_old = Some(row.alleles.clone());
                split.a_index = Some(a_index);
                if row.alleles.len() > 2 {
                    split.alleles = vec![row.alleles[0].clone(), row.alleles[a_index].clone()];
                    split.genotypes = row
                        .genotypes
                        .iter()
                        .map(|gt| gt.as_deref().map(|gt| downcode(gt, a_index)))
                        .collect();
                }
                rows.push(split);
            }
        }
        VariantTable {
            rows,
            ..self.clone()
        }
    }

    /// Keep only `ids` as sample columns, in callset order.
    pub fn subset_samples(&self, ids: &[String]) -> VariantTable {
        let keep: Vec<usize> = self
            .samples
            .iter()
            .enumerate()
            .filter(|(_, s)| ids.contains(s))
            .map(|(i, _)| i)
            .collect();
        let samples = keep.iter().map(|&i| self.samples[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| VariantRow {
                genotypes: keep
                    .iter()
                    .map(|&i| row.genotypes.get(i).cloned().flatten())
                    .collect(),
                ..row.clone()
            })
            .collect();
        VariantTable {
            samples,
            rows,
            ..self.clone()
        }
    }

    /// Render a row as a search document.
    pub fn document(&self, row: &VariantRow, id_field: &str, write_nulls: bool) -> Value {
        let mut doc = Map::new();
        doc.insert(id_field.to_string(), Value::String(row.document_id()));
        if let Some(locus) = &row.locus {
            doc.insert("contig".into(), json!(locus.contig));
            doc.insert("pos".into(), json!(locus.position));
        }
        doc.insert("ref".into(), json!(row.alleles.first()));
        doc.insert("alt".into(), json!(row.alleles.get(1)));
        doc.insert("variantId".into(), json!(row.variant_id));
        doc.insert("filters".into(), json!(row.filters));
        for (name, value) in &row.annotations {
            doc.insert(name.clone(), value.clone());
        }
        let genotypes: Vec<Value> = self
            .samples
            .iter()
            .zip(&row.genotypes)
            .filter_map(|(sample, gt)| {
                gt.as_ref()
                    .map(|gt| json!({ "sampleId": sample, "gt": gt }))
            })
            .collect();
        doc.insert("genotypes".into(), Value::Array(genotypes));
        if !write_nulls {
            doc.retain(|_, value| !value.is_null());
        }
        Value::Object(doc)
    }
}

/// Parse a plain-text VCF: header line for samples, GT from each sample field.
pub fn parse_vcf(
    text: &str,
    recoding: &BTreeMap<String, String>,
    skip_invalid_loci: bool,
) -> Result<(Vec<String>, Vec<VariantRow>), String> {
    let mut samples: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        if line.starts_with("##") || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if line.starts_with("#CHROM") {
            samples = Some(fields.iter().skip(9).map(|s| s.to_string()).collect());
            continue;
        }
        let header = samples
            .as_ref()
            .ok_or_else(|| format!("line {}: data before #CHROM header", line_no + 1))?;
        if fields.len() < 8 {
            return Err(format!("line {}: expected at least 8 columns", line_no + 1));
        }

        let position = match fields[1].parse::<u64>() {
            Ok(pos) if pos > 0 => pos,
            _ if skip_invalid_loci => continue,
            _ => return Err(format!("line {}: invalid position {}", line_no + 1, fields[1])),
        };
        let contig = recoding
            .get(fields[0])
            .cloned()
            .unwrap_or_else(|| fields[0].to_string());

        let mut alleles = vec![fields[3].to_string()];
        alleles.extend(fields[4].split(',').filter(|a| *a != ".").map(String::from));

        let filters = match fields[6] {
            "." => None,
            "PASS" => Some(Vec::new()),
            other => Some(other.split(';').map(String::from).collect()),
        };

        let gt_index = fields
            .get(8)
            .and_then(|format| format.split(':').position(|key| key == "GT"));
        let genotypes = (0..header.len())
            .map(|i| {
                let call = fields.get(9 + i)?;
                let gt = call.split(':').nth(gt_index?)?;
                if gt.starts_with('.') {
                    None
                } else {
                    Some(gt.to_string())
                }
            })
            .collect();

        rows.push(VariantRow {
            locus: Some(Locus { contig, position }),
            alleles,
            variant_id: (fields[2] != ".").then(|| fields[2].to_string()),
            filters,
            genotypes,
            ..VariantRow::default()
        });
    }

    Ok((samples.unwrap_or_default(), rows))
}

/// Parse a call table with columns `variant_id chr start sample_id [genotype]`.
///
/// Rows are grouped by variant id; the variant's position is the minimum start.
pub fn parse_call_table(text: &str) -> Result<(Vec<String>, Vec<VariantRow>), String> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| "empty call table".to_string())?
        .split('\t')
        .collect();
    let column = |name: &str| {
        header
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| format!("missing column {}", name))
    };
    let (id_col, chr_col, start_col, sample_col) = (
        column("variant_id")?,
        column("chr")?,
        column("start")?,
        column("sample_id")?,
    );
    let gt_col = column("genotype").ok();

    let mut samples: Vec<String> = Vec::new();
    let mut variants: BTreeMap<String, (String, u64, BTreeMap<String, String>)> = BTreeMap::new();
    for line in lines {
        let fields: Vec<&str> = line.split('\t').collect();
        let get = |i: usize| fields.get(i).copied().unwrap_or_default();
        let start = get(start_col)
            .parse::<u64>()
            .map_err(|_| format!("invalid start {}", get(start_col)))?;
        let sample = get(sample_col).to_string();
        if !samples.contains(&sample) {
            samples.push(sample.clone());
        }
        let entry = variants
            .entry(get(id_col).to_string())
            .or_insert_with(|| (get(chr_col).to_string(), start, BTreeMap::new()));
        entry.1 = entry.1.min(start);
        let gt = gt_col.map(get).unwrap_or("0/1");
        entry.2.insert(sample, gt.to_string());
    }

    let rows = variants
        .into_iter()
        .map(|(variant_id, (contig, position, calls))| VariantRow {
            locus: Some(Locus { contig, position }),
            variant_id: Some(variant_id),
            genotypes: samples.iter().map(|s| calls.get(s).cloned()).collect(),
            ..VariantRow::default()
        })
        .collect();
    Ok((samples, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VCF: &str = "##fileformat=VCFv4.2\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tA\tB\n\
1\t100\t.\tA\tT\t.\tPASS\t.\tGT\t0/1\t0/0\n\
1\t200\trs1\tG\tC,T\t.\tLowQual\t.\tGT:DP\t1/2:10\t./.:0\n\
1\t0\t.\tC\tG\t.\tPASS\t.\tGT\t0/1\t0/1\n";

    #[test]
    fn parses_vcf_with_recoding_and_invalid_loci() {
        let recoding = BTreeMap::from([("1".to_string(), "chr1".to_string())]);
        let (samples, rows) = parse_vcf(VCF, &recoding, true).unwrap();
        assert_eq!(samples, vec!["A", "B"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].locus.as_ref().unwrap().contig, "chr1");
        assert_eq!(rows[1].alleles, vec!["G", "C", "T"]);
        assert_eq!(rows[1].filters, Some(vec!["LowQual".to_string()]));
        assert_eq!(rows[1].genotypes, vec![Some("1/2".to_string()), None]);

        assert!(parse_vcf(VCF, &recoding, false).is_err());
    }

    #[test]
    fn split_multi_preserves_original_locus_and_alleles() {
        let (samples, rows) = parse_vcf(VCF, &BTreeMap::new(), true).unwrap();
        let table = VariantTable {
            key_fields: vec!["locus".into(), "alleles".into()],
            samples,
            rows,
            globals: Map::new(),
        };
        let split = table.split_multi();
        assert_eq!(split.rows.len(), 3);
        let second = &split.rows[1];
        assert_eq!(second.alleles, vec!["G", "C"]);
        assert_eq!(second.alleles_old, Some(vec!["G".into(), "C".into(), "T".into()]));
        assert_eq!(second.genotypes[0].as_deref(), Some("1/0"));
        let third = &split.rows[2];
        assert_eq!(third.alleles, vec!["G", "T"]);
        assert_eq!(third.genotypes[0].as_deref(), Some("0/1"));
        assert_eq!(split.rows[0].a_index, Some(1));
    }

    #[test]
    fn call_table_groups_by_variant() {
        let text = "variant_id\tchr\tstart\tsample_id\n\
                    del_1\tchr1\t500\tS1\n\
                    del_1\tchr1\t450\tS2\n\
                    dup_2\tchr2\t900\tS2\n";
        let (samples, rows) = parse_call_table(text).unwrap();
        assert_eq!(samples, vec!["S1", "S2"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].locus.as_ref().unwrap().position, 450);
        assert_eq!(rows[1].genotypes, vec![None, Some("0/1".to_string())]);
    }

    #[test]
    fn documents_write_nulls_explicitly() {
        let table = VariantTable {
            key_fields: vec!["locus".into(), "alleles".into()],
            samples: vec!["A".into()],
            rows: vec![VariantRow {
                locus: Some(Locus { contig: "chr1".into(), position: 10 }),
                alleles: vec!["A".into(), "G".into()],
                genotypes: vec![Some("0/1".into())],
                ..VariantRow::default()
            }],
            globals: Map::new(),
        };
        let with_nulls = table.document(&table.rows[0], "docId", true);
        assert_eq!(with_nulls["docId"], "1-10-A-G");
        assert!(with_nulls.as_object().unwrap().contains_key("filters"));
        assert!(with_nulls["filters"].is_null());

        let without = table.document(&table.rows[0], "docId", false);
        assert!(!without.as_object().unwrap().contains_key("filters"));
    }

    #[test]
    fn non_ref_detection() {
        assert!(is_non_ref("0/1"));
        assert!(is_non_ref("1|1"));
        assert!(!is_non_ref("0/0"));
        assert!(!is_non_ref("./."));
    }
}
