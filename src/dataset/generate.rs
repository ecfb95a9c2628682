use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::csv::WriterBuilder;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::core::{BenchError, Q3_STUDENT_IDS, TARGET_COURSE_NAME};
use crate::dataset::reader::COLUMNS;
use crate::dataset::{DatasetRecord, SubmissionStatus};

/// Professor assigned to the fixed students' course.
pub const FIXED_PROFESSOR_ID: i64 = 676734;

const ID_BASE: i64 = 100_000;
const COURSE_ID_BASE: i64 = 100_000;
const WRITE_BATCH_SIZE: usize = 65_536;

/// (name, content, assignment titles). Course id is `COURSE_ID_BASE + index`.
const COURSES: [(&str, &str, &[&str]); 30] = [
    (
        "Artificial Intelligence & Robotics",
        "Principles of AI, robotics, machine learning, and their applications.",
        &[
            "Introduction to AI", "Machine Learning Basics", "Robotics and Control",
            "Neural Networks in AI", "Deep Learning Models", "AI in Healthcare", "AI and Ethics",
            "AI Algorithms", "Robotics in Manufacturing", "Future of Robotics",
        ],
    ),
    (
        "Mechanical Engineering",
        "Design and analysis of mechanical systems, thermodynamics, and materials science.",
        &[
            "Strength of Materials", "Thermodynamics Principles", "Fluid Mechanics",
            "Material Science", "Mechanical Vibrations", "Thermal Engineering",
            "Mechanisms and Machines", "Engineering Drawing", "Mechanical Design",
            "Manufacturing Processes",
        ],
    ),
    (
        "Aerospace Engineering",
        "Study of aerodynamics, spacecraft design, propulsion systems, and flight mechanics.",
        &[
            "Aerodynamics", "Space Exploration", "Flight Mechanics", "Aircraft Structures",
            "Control Systems", "Spacecraft Design", "Rocket Propulsion", "Avionics Systems",
            "Navigation and Guidance", "Aerospace Materials",
        ],
    ),
    (
        "Supply Chain Management & Logistics",
        "Methods for optimizing supply chains, logistics, and distribution systems.",
        &[
            "Logistics and Distribution", "Inventory Management", "Supply Chain Optimization",
            "Global Logistics", "Transportation Management", "Warehousing", "Demand Planning",
            "Supplier Relationship Management", "Risk Management", "Supply Chain Technologies",
        ],
    ),
    (
        "International Business",
        "Study of global business, international markets, and strategies for operating worldwide.",
        &[
            "Global Market Analysis", "Cross-cultural Management", "International Trade",
            "International Finance", "Global Business Strategy", "Emerging Markets",
            "Global Entrepreneurship", "Multinational Management", "Global Marketing",
            "International Negotiation",
        ],
    ),
    (
        "Master of Business Administration (MBA)",
        "An integrated study of management principles for aspiring business leaders.",
        &[
            "Business Strategy", "Financial Management", "Marketing Principles",
            "Operations Management", "Human Resource Management", "Entrepreneurship",
            "Business Ethics", "Leadership Skills", "Global Business", "Strategic Management",
        ],
    ),
    (
        "IT Management",
        "Managing IT infrastructure, strategies, and systems in organizations.",
        &[
            "IT Strategy", "Cybersecurity Management", "Information Systems",
            "Business Intelligence", "Enterprise Resource Planning", "Cloud Computing",
            "Data Governance", "Project Management", "Technology Innovation", "IT Operations",
        ],
    ),
    (
        "Human Resource Management",
        "Focus on recruitment, employee management, and organizational behavior.",
        &[
            "Recruitment and Selection", "Employee Relations", "Labor Laws",
            "Training and Development", "Performance Management", "Organizational Behavior",
            "Workplace Diversity", "Compensation and Benefits", "HR Analytics", "Strategic HRM",
        ],
    ),
    (
        "Architecture",
        "Study of building design, structural engineering, and sustainable architecture.",
        &[
            "Architectural Design", "Building Systems", "Construction Management", "Urban Design",
            "Sustainability in Architecture", "Architectural Theory", "Materials and Construction",
            "Structural Design", "Interior Architecture", "Digital Fabrication",
        ],
    ),
    (
        "Interior Design",
        "Designing functional and aesthetic interiors for residential and commercial spaces.",
        &[
            "Design Principles", "Furniture Design", "Space Planning", "Lighting Design",
            "Sustainable Design", "Computer-Aided Design", "Residential Interiors",
            "Commercial Interiors", "Architectural Detailing", "Design Psychology",
        ],
    ),
    (
        "Cybersecurity & Forensic Science",
        "Study of digital forensics, network security, and crime scene investigation techniques.",
        &[
            "Network Security", "Cryptography", "Digital Forensics", "Incident Response",
            "Cybercrime Investigation", "Cyber Law", "Risk Management", "Ethical Hacking",
            "Malware Analysis", "Cybersecurity Technologies",
        ],
    ),
    (
        "Emergency & Disaster Management",
        "Planning and coordination for disaster prevention, response, and recovery.",
        &[
            "Disaster Preparedness", "Crisis Management", "Risk Assessment",
            "Public Health Emergency", "Incident Command Systems", "Search and Rescue",
            "Emergency Response Coordination", "Disaster Recovery", "Community Resilience",
            "Humanitarian Assistance",
        ],
    ),
    (
        "Computer Science",
        "Fundamentals of programming, algorithms, data structures, and computer architecture.",
        &[
            "Data Structures", "Algorithms", "Operating Systems", "Software Engineering",
            "Database Systems", "Computer Networks", "Web Development", "Machine Learning",
            "Artificial Intelligence", "Mobile Application Development",
        ],
    ),
    (
        "Information Technology",
        "Application and management of IT systems, networks, and security.",
        &[
            "Networking Fundamentals", "Web Technologies", "Database Management", "System Analysis",
            "Project Management", "Security in IT", "Cloud Computing", "Data Warehousing",
            "E-Commerce", "Software Development",
        ],
    ),
    (
        "Artificial Intelligence & Machine Learning",
        "Foundations and advanced concepts in AI, machine learning, and neural networks.",
        &[
            "Introduction to Machine Learning", "Supervised Learning", "Unsupervised Learning",
            "Neural Networks", "Deep Learning", "Reinforcement Learning",
            "Natural Language Processing", "Computer Vision", "AI Applications", "AI Ethics",
        ],
    ),
    (
        "Data Analysis",
        "Techniques for analyzing and interpreting data to uncover trends and insights.",
        &[
            "Statistical Analysis", "Regression Analysis", "Data Cleaning",
            "Exploratory Data Analysis", "Data Visualization", "Machine Learning in Data Analysis",
            "Big Data", "Time Series Analysis", "Predictive Modeling", "Data Analysis with Python",
        ],
    ),
    (
        "Cyber Security",
        "Study of security technologies, ethical hacking, and techniques to protect against cyber threats.",
        &[
            "Network Security", "Security Protocols", "Cryptography", "Risk Management",
            "Ethical Hacking", "Security Operations", "Malware Analysis", "Penetration Testing",
            "Security Policy", "Cyber Threat Intelligence",
        ],
    ),
    (
        "Cloud Computing",
        "Exploring the architecture, services, and deployment models of cloud computing.",
        &[
            "Cloud Architecture", "Virtualization", "Cloud Security", "Cloud Services",
            "Distributed Systems", "Cloud Storage", "Cloud-based Applications",
            "Cloud Computing Platforms", "Data Center Management", "Cloud Computing Security",
        ],
    ),
    (
        "Hospitality Management",
        "Operations, marketing, and management of the hospitality industry.",
        &[
            "Hotel Management", "Food and Beverage Management", "Event Planning",
            "Hospitality Marketing", "Tourism Management", "Guest Services",
            "Hospitality Operations", "Sustainable Tourism", "Hospitality Law",
            "Leadership in Hospitality",
        ],
    ),
    (
        "Tourism & Leisure",
        "Study of tourism systems, leisure management, and the business of travel.",
        &[
            "Tourism Planning", "Tourism Economics", "Cultural Heritage", "Tourism Marketing",
            "Tourism Destination Management", "Sustainable Tourism", "Tourism Policy",
            "Leisure Management", "Event Planning", "Tourism Research",
        ],
    ),
    (
        "Psychology",
        "The study of human behavior, cognition, emotions, and mental health.",
        &[
            "Introduction to Psychology", "Behavioral Psychology", "Cognitive Psychology",
            "Developmental Psychology", "Clinical Psychology", "Psychological Testing",
            "Neuropsychology", "Social Psychology", "Psychopathology", "Psychotherapy",
        ],
    ),
    (
        "Medicine",
        "Healthcare practices, patient care, and clinical applications in medicine.",
        &[
            "Anatomy and Physiology", "Medical Ethics", "Pathology", "Pharmacology",
            "Clinical Skills", "Public Health", "Medical Microbiology", "Immunology",
            "Medical Research", "Medical Imaging",
        ],
    ),
    (
        "Political Science and International Relations",
        "Study of political systems, international organizations, and governance.",
        &[
            "International Relations Theory", "Political Systems", "Comparative Politics",
            "Public Policy", "Global Governance", "International Law", "Political Economy",
            "Conflict Resolution", "International Organizations", "Foreign Policy Analysis",
        ],
    ),
    (
        "Nursing",
        "Study of patient care, nursing practices, and the healthcare system.",
        &[
            "Nursing Fundamentals", "Clinical Nursing", "Healthcare Ethics", "Nursing Research",
            "Pharmacology for Nurses", "Pediatric Nursing", "Adult Nursing", "Psychiatric Nursing",
            "Community Health Nursing", "Geriatric Nursing",
        ],
    ),
    (
        "International Law",
        "Global legal systems, human rights, and international trade law.",
        &[
            "International Legal Systems", "Human Rights Law", "International Trade Law",
            "International Humanitarian Law", "Dispute Resolution", "International Criminal Law",
            "Diplomacy and Law", "International Arbitration", "Sovereignty",
            "International Environmental Law",
        ],
    ),
    (
        "Criminal Justice",
        "Study of crime, law enforcement, legal systems, and the criminal justice process.",
        &[
            "Criminal Law", "Criminal Procedure", "Forensic Science", "Crime and Society",
            "Policing", "Corrections", "Criminal Investigations", "Juvenile Justice",
            "Ethics in Criminal Justice", "Victimology",
        ],
    ),
    (
        "Economics",
        "Theory and practice of economics, market behaviors, and economic policies.",
        &[
            "Microeconomics", "Macroeconomics", "International Economics", "Development Economics",
            "Economic Theory", "Public Finance", "Labor Economics", "Environmental Economics",
            "Behavioral Economics", "Econometrics",
        ],
    ),
    (
        "Forensic Psychology",
        "Psychological aspects of criminal behavior, profiling, and legal proceedings.",
        &[
            "Criminal Behavior", "Psychological Assessment", "Mental Health Law", "Psychopathology",
            "Criminal Profiling", "Jury Decision Making", "Psychological Testing",
            "Forensic Interviewing", "Risk Assessment", "Violent Crime",
        ],
    ),
    (
        "Archaeology",
        "Exploring ancient cultures through material evidence and archaeological methods.",
        &[
            "Prehistoric Archaeology", "Historical Archaeology", "Field Methods",
            "Ethnoarchaeology", "Archaeological Theory", "Cultural Resource Management",
            "Archaeological Excavation", "Ancient Civilizations", "Material Culture",
            "Archaeological Science",
        ],
    ),
    (
        "Sociology",
        "Examination of social behavior, groups, and societal issues.",
        &[
            "Introduction to Sociology", "Social Theory", "Social Problems", "Cultural Sociology",
            "Sociological Research", "Gender Studies", "Sociology of Education",
            "Race and Ethnicity", "Urban Sociology", "Criminology",
        ],
    ),
];

const FIRST_NAMES: [&str; 16] = [
    "Alex", "Bianca", "Chen", "Dario", "Elena", "Farah", "Goran", "Hana", "Ivan", "Jun", "Kemal",
    "Lucia", "Marek", "Nadia", "Omar", "Priya",
];

const LAST_NAMES: [&str; 16] = [
    "Rossi", "Novak", "Silva", "Kim", "Okafor", "Larsen", "Haddad", "Moreau", "Tanaka", "Kowalski",
    "Mendes", "Varga", "Nguyen", "Ibrahim", "Fischer", "Costa",
];

fn course_index(name: &str) -> usize {
    COURSES
        .iter()
        .position(|(course, _, _)| *course == name)
        .unwrap_or(0)
}

fn email_for(name: &str) -> String {
    format!("{}@example.com", name.to_lowercase().replace(' ', "_"))
}

fn random_name(rng: &mut StdRng) -> String {
    format!(
        "{} {}",
        FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())],
        LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())]
    )
}

fn unique_ids(rng: &mut StdRng, count: usize) -> Vec<i64> {
    let mut ids: Vec<i64> = (ID_BASE..ID_BASE + count.max(1) as i64).collect();
    ids.shuffle(rng);
    ids
}

/// Generate `num_records` random rows preceded by one row for each Q3 student.
///
/// The fixed students sit in the target course, taught by
/// [`FIXED_PROFESSOR_ID`], with an unsubmitted assignment scored 0.
/// Output is fully determined by `seed`.
pub fn generate_records(num_records: usize, seed: u64) -> Vec<DatasetRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let student_ids = unique_ids(&mut rng, num_records);
    let professor_ids = unique_ids(&mut rng, num_records / 10);
    let assignment_ids = unique_ids(&mut rng, num_records / 10);

    let mut records = Vec::with_capacity(num_records + Q3_STUDENT_IDS.len());

    let target = course_index(TARGET_COURSE_NAME);
    let (course_name, course_content, _) = COURSES[target];
    let professor_name = random_name(&mut rng);
    for student_id in Q3_STUDENT_IDS.iter().rev() {
        let student_name = random_name(&mut rng);
        records.push(DatasetRecord {
            course_id: COURSE_ID_BASE + target as i64,
            course_name: course_name.to_string(),
            course_content: course_content.to_string(),
            student_id: *student_id,
            student_email: email_for(&student_name),
            student_name,
            professor_id: FIXED_PROFESSOR_ID,
            professor_email: email_for(&professor_name),
            professor_name: professor_name.clone(),
            assignment_id: assignment_ids[rng.gen_range(0..assignment_ids.len())],
            assignment_title: "Database: Course Management System".to_string(),
            submission_status: SubmissionStatus::No,
            score: 0,
        });
    }

    for i in 0..num_records {
        let course = rng.gen_range(0..COURSES.len());
        let (course_name, course_content, titles) = COURSES[course];
        let student_name = random_name(&mut rng);
        let professor_name = random_name(&mut rng);
        let submission_status = if rng.gen_bool(0.5) {
            SubmissionStatus::Yes
        } else {
            SubmissionStatus::No
        };
        let score = match submission_status {
            SubmissionStatus::Yes => rng.gen_range(18..=30),
            SubmissionStatus::No => 0,
        };

        records.push(DatasetRecord {
            course_id: COURSE_ID_BASE + course as i64,
            course_name: course_name.to_string(),
            course_content: course_content.to_string(),
            student_id: student_ids[i],
            student_email: email_for(&student_name),
            student_name,
            professor_id: professor_ids[i % professor_ids.len()],
            professor_email: email_for(&professor_name),
            professor_name,
            assignment_id: assignment_ids[i % assignment_ids.len()],
            assignment_title: titles[rng.gen_range(0..titles.len())].to_string(),
            submission_status,
            score,
        });
    }

    records
}

fn to_batch(schema: &Arc<Schema>, records: &[DatasetRecord]) -> Result<RecordBatch, BenchError> {
    let ints = |f: fn(&DatasetRecord) -> i64| -> ArrayRef {
        Arc::new(Int64Array::from(records.iter().map(f).collect::<Vec<_>>()))
    };
    let strs = |f: fn(&DatasetRecord) -> &str| -> ArrayRef {
        Arc::new(records.iter().map(|r| Some(f(r))).collect::<StringArray>())
    };
    let columns: Vec<ArrayRef> = vec![
        ints(|r| r.course_id),
        strs(|r| r.course_name.as_str()),
        strs(|r| r.course_content.as_str()),
        ints(|r| r.student_id),
        strs(|r| r.student_name.as_str()),
        strs(|r| r.student_email.as_str()),
        ints(|r| r.professor_id),
        strs(|r| r.professor_name.as_str()),
        strs(|r| r.professor_email.as_str()),
        ints(|r| r.assignment_id),
        strs(|r| r.assignment_title.as_str()),
        strs(|r| r.submission_status.as_str()),
        ints(|r| r.score),
    ];
    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

/// Write records as a headed CSV file, creating parent directories.
pub fn write_csv(path: &Path, records: &[DatasetRecord]) -> Result<(), BenchError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let schema = Arc::new(Schema::new(
        COLUMNS
            .iter()
            .map(|(name, dtype)| Field::new(*name, dtype.clone(), false))
            .collect::<Vec<_>>(),
    ));

    let file = File::create(path)?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    if records.is_empty() {
        writer.write(&RecordBatch::new_empty(schema))?;
        return Ok(());
    }
    for chunk in records.chunks(WRITE_BATCH_SIZE) {
        writer.write(&to_batch(&schema, chunk)?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::dataset::read_records;

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(generate_records(50, 42), generate_records(50, 42));
        assert_ne!(generate_records(50, 42), generate_records(50, 43));
    }

    #[test]
    fn test_fixed_students_lead() {
        let records = generate_records(100, 3);
        assert_eq!(records.len(), 102);
        for record in &records[..2] {
            assert!(Q3_STUDENT_IDS.contains(&record.student_id));
            assert_eq!(record.course_name, TARGET_COURSE_NAME);
            assert_eq!(record.course_id, 100_015);
            assert_eq!(record.professor_id, FIXED_PROFESSOR_ID);
            assert_eq!(record.submission_status, SubmissionStatus::No);
            assert_eq!(record.score, 0);
        }
    }

    #[test]
    fn test_scores_follow_status() {
        for record in generate_records(500, 9) {
            match record.submission_status {
                SubmissionStatus::Yes => assert!((18..=30).contains(&record.score)),
                SubmissionStatus::No => assert_eq!(record.score, 0),
            }
            let course = (record.course_id - COURSE_ID_BASE) as usize;
            assert_eq!(COURSES[course].0, record.course_name);
        }
    }

    #[test]
    fn test_every_course_has_ten_titles() {
        for (name, _, titles) in COURSES {
            let distinct: std::collections::HashSet<_> = titles.iter().collect();
            assert_eq!(distinct.len(), 10, "{}", name);
        }
        for record in &generate_records(300, 5)[2..] {
            let course = (record.course_id - COURSE_ID_BASE) as usize;
            assert!(COURSES[course].2.contains(&record.assignment_title.as_str()));
        }
    }

    #[test]
    fn test_csv_written_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("records.csv");
        let records = generate_records(20, 11);

        write_csv(&path, &records).unwrap();
        let header = std::fs::read_to_string(&path).unwrap();
        assert!(header.starts_with("course_id,course_name,course_content,student_id"));

        assert_eq!(read_records(&path, None).unwrap(), records);
    }
}
