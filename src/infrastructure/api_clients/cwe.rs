//! Local CWE catalogue used to name the weakness ids NVD reports

use crate::domain::Cwe;

/// `(id, name, description)` of the weaknesses most often seen in library advisories
const CATALOGUE: &[(&str, &str, &str)] = &[
    (
        "CWE-20",
        "Improper Input Validation",
        "The product does not validate or incorrectly validates input that can affect control or data flow.",
    ),
    (
        "CWE-22",
        "Path Traversal",
        "Pathnames built from external input are not neutralized and can resolve outside the restricted directory.",
    ),
    (
        "CWE-74",
        "Injection",
        "Externally influenced input is used to build a command or data structure without neutralizing special elements.",
    ),
    (
        "CWE-77",
        "Command Injection",
        "Special elements in externally influenced input can modify an intended command.",
    ),
    (
        "CWE-78",
        "OS Command Injection",
        "Special elements in externally influenced input can modify an operating system command.",
    ),
    (
        "CWE-79",
        "Cross-site Scripting",
        "User-controllable input is placed in output served as a web page without neutralization.",
    ),
    (
        "CWE-89",
        "SQL Injection",
        "Special elements in externally influenced input can modify an SQL command.",
    ),
    (
        "CWE-94",
        "Code Injection",
        "Externally influenced input is used to construct a code segment that is executed.",
    ),
    (
        "CWE-116",
        "Improper Encoding or Escaping of Output",
        "Structured output is prepared without encoding or escaping the data it contains.",
    ),
    (
        "CWE-119",
        "Buffer Overflow",
        "Operations on a memory buffer can read from or write to locations outside its bounds.",
    ),
    (
        "CWE-125",
        "Out-of-bounds Read",
        "The product reads data past the end, or before the beginning, of the intended buffer.",
    ),
    (
        "CWE-185",
        "Incorrect Regular Expression",
        "A regular expression is specified that does not correctly match the intended data.",
    ),
    ("CWE-190", "Integer Overflow", "A calculation can produce an integer overflow or wraparound."),
    (
        "CWE-200",
        "Information Exposure",
        "Sensitive information is exposed to an actor that is not authorized to access it.",
    ),
    (
        "CWE-284",
        "Improper Access Control",
        "Access to a resource is not restricted or is incorrectly restricted.",
    ),
    (
        "CWE-287",
        "Improper Authentication",
        "A claimed identity is not proven or is insufficiently proven.",
    ),
    (
        "CWE-295",
        "Improper Certificate Validation",
        "A certificate is not validated or is incorrectly validated.",
    ),
    (
        "CWE-327",
        "Broken or Risky Cryptographic Algorithm",
        "A broken or risky cryptographic algorithm or protocol is used.",
    ),
    (
        "CWE-330",
        "Insufficiently Random Values",
        "Values that are not sufficiently random are used in a security context.",
    ),
    (
        "CWE-345",
        "Insufficient Verification of Data Authenticity",
        "The origin or authenticity of data is not sufficiently verified.",
    ),
    (
        "CWE-352",
        "Cross-Site Request Forgery",
        "The product does not verify that a request was intentionally provided by the user who submitted it.",
    ),
    (
        "CWE-362",
        "Race Condition",
        "Concurrent code uses a shared resource without proper synchronization.",
    ),
    (
        "CWE-400",
        "Uncontrolled Resource Consumption",
        "Allocation and maintenance of a limited resource is not properly controlled.",
    ),
    ("CWE-401", "Memory Leak", "Memory is not released after its effective lifetime has ended."),
    ("CWE-416", "Use After Free", "Memory is referenced after it has been freed."),
    (
        "CWE-434",
        "Unrestricted File Upload",
        "Files of dangerous types can be uploaded and processed automatically.",
    ),
    (
        "CWE-476",
        "NULL Pointer Dereference",
        "A pointer expected to be valid is dereferenced while NULL.",
    ),
    (
        "CWE-502",
        "Deserialization of Untrusted Data",
        "Untrusted data is deserialized without sufficient verification.",
    ),
    ("CWE-601", "Open Redirect", "A user-controlled input is used as the target of a redirect."),
    (
        "CWE-611",
        "XML External Entity Reference",
        "XML documents may reference external entities that resolve outside the intended sphere of control.",
    ),
    (
        "CWE-674",
        "Uncontrolled Recursion",
        "Recursion is not controlled and can consume excessive resources.",
    ),
    (
        "CWE-693",
        "Protection Mechanism Failure",
        "A protection mechanism is missing or used incorrectly.",
    ),
    (
        "CWE-770",
        "Allocation of Resources Without Limits",
        "Resources are allocated without limits or throttling.",
    ),
    (
        "CWE-787",
        "Out-of-bounds Write",
        "The product writes data past the end, or before the beginning, of the intended buffer.",
    ),
    (
        "CWE-798",
        "Hard-coded Credentials",
        "The product contains hard-coded credentials such as a password or key.",
    ),
    (
        "CWE-835",
        "Infinite Loop",
        "An iteration or loop has an exit condition that cannot be reached.",
    ),
    (
        "CWE-863",
        "Incorrect Authorization",
        "An authorization check does not correctly determine whether access is allowed.",
    ),
    (
        "CWE-915",
        "Prototype Pollution",
        "Object attributes that should not be modifiable can be set from external input.",
    ),
    (
        "CWE-917",
        "Expression Language Injection",
        "Externally influenced input is used in an expression language statement.",
    ),
    (
        "CWE-918",
        "Server-Side Request Forgery",
        "The server retrieves a URL supplied by an upstream component without sufficient validation.",
    ),
    (
        "CWE-1321",
        "Prototype Pollution",
        "Object prototype attributes can be modified through unsafe recursive merges.",
    ),
    (
        "CWE-1333",
        "Inefficient Regular Expression Complexity",
        "A regular expression with exponential worst-case complexity is used.",
    ),
];

/// Resolve a CWE id such as `CWE-79` to its catalogue entry.
///
/// NVD placeholders (`NVD-CWE-noinfo`, `NVD-CWE-Other`) and ids missing from
/// the catalogue keep the id as their name.
pub fn lookup(id: &str) -> Cwe {
    let id = id.trim();
    match CATALOGUE
        .iter()
        .find(|(known, _, _)| known.eq_ignore_ascii_case(id))
    {
        Some((known, name, description)) => Cwe::new(*known, *name, *description),
        None if id == "NVD-CWE-noinfo" => Cwe::new(id, "Insufficient Information", ""),
        None if id == "NVD-CWE-Other" => Cwe::new(id, "Other", ""),
        None => Cwe::new(id, id, ""),
    }
}
