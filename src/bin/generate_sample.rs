use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, Days, NaiveDate};
use parquet::arrow::ArrowWriter;

const COUNTRIES: [&str; 4] = ["Syria", "Lebanon", "Jordan", "Palestine"];
const GENDERS: [&str; 3] = ["Male", "Female", "Unknown"];
const NATURES: [&str; 7] = [
    "Arrest",
    "Physical assault",
    "Threat",
    "Killing",
    "Prosecution",
    "Raid",
    "Censorship",
];
const ATTACKERS: [&str; 5] = [
    "Security forces",
    "Armed group",
    "Unknown",
    "Judiciary",
    "Civilians",
];
const OCCUPATIONS: [&str; 5] = [
    "Journalist",
    "Photographer",
    "Activist",
    "Writer",
    "Media worker",
];

/// Governance baseline per country: WB_VA, WB_PS, WB_GovE, WB_RQ, WB_RoL,
/// WB_CoC, RSF_Score.
const GOVERNANCE: [[f64; 7]; 4] = [
    [-1.9, -2.7, -1.6, -1.9, -1.9, -1.6, 17.4],
    [-0.5, -1.6, -1.2, -0.8, -1.2, -1.3, 56.7],
    [-0.6, -0.4, 0.1, 0.2, 0.3, 0.1, 52.1],
    [-1.1, -1.8, -0.8, -0.6, -0.5, -0.6, 37.0],
];

const TOPIC_WORDS: [&[(&str, f64)]; 10] = [
    &[("غارة", 0.092), ("قصف", 0.081), ("طيران", 0.044), ("في", 0.040)],
    &[("محكمة", 0.071), ("قانون", 0.055), ("نقابة", 0.031)],
    &[("أمن", 0.064), ("مراقبة", 0.047), ("هاتف", 0.022)],
    &[("قاضي", 0.068), ("جلسة", 0.052), ("حكم", 0.049), ("من", 0.035)],
    &[("مداهمة", 0.077), ("اعتقال", 0.073), ("منزل", 0.050)],
    &[("اشتباك", 0.066), ("جيش", 0.058), ("مسلح", 0.041)],
    &[("تعذيب", 0.088), ("ضرب", 0.061), ("سجن", 0.043)],
    &[("الأردن", 0.054), ("إعلام", 0.051), ("حكومة", 0.037)],
    &[("تهديد", 0.083), ("رسائل", 0.039), ("على", 0.030)],
    &[("معتقل", 0.072), ("شهادة", 0.057), ("فرع", 0.033)],
];

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_f64() * n as f64) as usize % n
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[self.below(items.len())]
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

struct Incident {
    id: String,
    country: &'static str,
    date: String,
    victims: i64,
    gender: &'static str,
    nature: &'static str,
    attackers: &'static str,
    occupation: &'static str,
    governance: [f64; 7],
}

fn generate_incidents(rng: &mut SimpleRng, count: usize) -> Result<Vec<Incident>> {
    let first_day = NaiveDate::from_ymd_opt(2018, 1, 1).context("invalid start date")?;
    let mut incidents = Vec::with_capacity(count);
    let mut id = 0;
    while incidents.len() < count {
        id += 1;
        let c = rng.below(COUNTRIES.len());
        let date = first_day + Days::new(rng.below(6 * 365) as u64);
        // Some violations span several victims and get one row each.
        let rows = 1 + rng.below(3);
        let year_drift = f64::from(date.year() - first_day.year()) * 0.05;
        let governance = GOVERNANCE[c].map(|v| v - year_drift);
        for _ in 0..rows.min(count - incidents.len()) {
            incidents.push(Incident {
                id: format!("V{id:05}"),
                country: COUNTRIES[c],
                date: date.format("%Y-%m-%d").to_string(),
                victims: rng.gauss(2.0, 1.5).round().max(1.0) as i64,
                gender: rng.pick(&GENDERS),
                nature: rng.pick(&NATURES),
                attackers: rng.pick(&ATTACKERS),
                occupation: rng.pick(&OCCUPATIONS),
                governance,
            });
        }
    }
    Ok(incidents)
}

const HEADER: [&str; 15] = [
    "Violation_ID",
    "Country",
    "Date",
    "Total_Victims",
    "Gender",
    "Violation_Nature",
    "Attackers",
    "Victim_Occupation",
    "WB_VA",
    "WB_PS",
    "WB_GovE",
    "WB_RQ",
    "WB_RoL",
    "WB_CoC",
    "RSF_Score",
];

fn write_incidents_csv(path: &Path, incidents: &[Incident]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(HEADER)?;
    for i in incidents {
        let mut row = vec![
            i.id.clone(),
            i.country.to_string(),
            i.date.clone(),
            i.victims.to_string(),
            i.gender.to_string(),
            i.nature.to_string(),
            i.attackers.to_string(),
            i.occupation.to_string(),
        ];
        row.extend(i.governance.iter().map(|v| format!("{v:.2}")));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_incidents_parquet(path: &Path, incidents: &[Incident]) -> Result<()> {
    let text = |f: fn(&Incident) -> &str| -> ArrayRef {
        Arc::new(StringArray::from(incidents.iter().map(f).collect::<Vec<_>>()))
    };
    let mut columns: Vec<ArrayRef> = vec![
        text(|i| i.id.as_str()),
        text(|i| i.country),
        text(|i| i.date.as_str()),
        Arc::new(Int64Array::from(
            incidents.iter().map(|i| i.victims).collect::<Vec<_>>(),
        )),
        text(|i| i.gender),
        text(|i| i.nature),
        text(|i| i.attackers),
        text(|i| i.occupation),
    ];
    for k in 0..7 {
        columns.push(Arc::new(Float64Array::from(
            incidents.iter().map(|i| i.governance[k]).collect::<Vec<_>>(),
        )));
    }

    let fields: Vec<Field> = HEADER
        .iter()
        .zip(&columns)
        .map(|(name, col)| Field::new(*name, col.data_type().clone(), false))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let batch = RecordBatch::try_new(schema.clone(), columns)?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn write_topics_csv(path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["Topic", "Word", "Weight"])?;
    for (topic, words) in TOPIC_WORDS.iter().enumerate() {
        for (word, weight) in words.iter() {
            writer.write_record([topic.to_string(), word.to_string(), weight.to_string()])?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let mut rng = SimpleRng::new(42);
    let incidents = generate_incidents(&mut rng, 600)?;

    let csv_path = Path::new("Cleaned_SKF_data.csv");
    let parquet_path = Path::new("Cleaned_SKF_data.parquet");
    let topics_path = Path::new("Topic_TopWords.csv");

    write_incidents_csv(csv_path, &incidents)?;
    write_incidents_parquet(parquet_path, &incidents)?;
    write_topics_csv(topics_path)?;

    println!(
        "Wrote {} incident rows to {} and {}, topic words to {}",
        incidents.len(),
        csv_path.display(),
        parquet_path.display(),
        topics_path.display()
    );
    Ok(())
}
