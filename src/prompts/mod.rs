//! Prompt templates for paraphrasing and reranking.
//!
//! Templates use `{item}` and `{candidates}` placeholders filled by [`render`].
//! Structured templates ask for a Python-style list of dicts, which the
//! lenient literal parser in `llm::literal` accepts along with JSON.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// System prompt sent with every completion.
pub const SYSTEM_PROMPT: &str =
    "The following is a conversation between a life cycle assessment (LCA) expert and an LCA AI assistant.";

pub const PROCESS_PARAPHRASE: &str = r#"To run a Life Cycle Assessment I need the item below described in plain language. Reply with the description only.

### Rules ###
- If the description is already generic, keep it as is. Example: {"Ingredient": "mild chili pepper"} -> mild chili pepper.
- Keep the specifics. "date sugar" must not become "sugar".
- Use all of the given information. Never say the information is limited, never ask for more and never refuse.
- If no plain description is possible, summarize what is given. A description is mandatory.
- No filler such as "Based on the details". Do not repeat these instructions.

### Example input ###
itemname: PRT.CLR.MFP.LRG - HP Color LaserJet Ent MFP M5...
itemdescription: PRT.CLR.MFP.LRG
itemcommodityname: Printers
unique_identifiername: UIN - OPERATIONS IT

### Example output ###
a color laserjet printer used for operations in an IT environment

### Input ###
{item}
"#;

pub const EIO_PARAPHRASE: &str = r#"I am assessing business activities with Environmentally Extended Input-Output (EEIO) emission factors, focusing on the materials and manufacturing phase of each activity. Before picking a factor I need a brief plain-language description of the activity that makes no assumptions beyond what is given.

Example activity:
itemname: PRT.CLR.MFP.LRG - HP Color LaserJet Ent MFP M5...
itemdescription: PRT.CLR.MFP.LRG
itemcommodityname: Printers
unique_identifiername: UIN - OPERATIONS IT

Example description: The item is a color laserjet printer used for operations in an IT environment.

Describe this activity the same way:
{item}

Use all of the given information and never say it is insufficient. If no plain description is possible, summarize what is given. No filler words and no repeated instructions. Reply with the description only."#;

pub const EIO_RERANK: &str = r#"
### Instructions ###
You are performing an economic input-output life cycle assessment (EIO-LCA).
You are given an activity description and candidate North American Industry Classification System (NAICS) entries with titles, descriptions and codes.
Order the candidates from most to least relevant and report only the top 5 unique titles with their codes.
Relevance means the environmental impact of the materials and manufacturing phase of the activity.

Escape special characters in 'justification' so the response parses as a Python literal.
Return a Python list of dictionaries with exactly the keys 'naics_code', 'justification' and 'naics_title', for example:
[{'naics_code': 334111, 'justification': '...', 'naics_title': '...'}]
Return nothing but the list.

### Example input ###
Activity description: 'IT hardware and software for enterprise operations'
NAICS titles, descriptions and codes:
[
{"naics_title": "Computer Facilities Management Services", "naics description": "Computer systems facilities (i.e., clients' facilities) management and operation services", "naics_code": "541513"},
{"naics_title": "Electronic Computer Manufacturing", "naics description": "Workstations, computer, manufacturing", "naics_code": "334111"},
{"naics_title": "All Other Support Services", "naics description": "Inventory computing services", "naics_code": "561990"}
]

### Example output ###
[
{'naics_code': 541513, 'justification': 'Covers management and operation of client computer systems, which matches enterprise IT operations.', 'naics_title': 'Computer Facilities Management Services'},
{'naics_code': 334111, 'justification': 'Covers manufacturing of computers and workstations, the hardware used in enterprise IT.', 'naics_title': 'Electronic Computer Manufacturing'}
]

### Input ###
Activity description: {item}
NAICS titles, descriptions and codes: {candidates}
"#;

pub const REFERENCE_PRODUCTS: &str = r#"
### Instructions ###
You are a Life Cycle Assessment expert performing a process-based LCA.
Given an 'item description' and a list of 'reference_product's, report at most 5 best matching reference products, best match first, as a Python list of dictionaries.
Each dictionary has exactly the keys 'justification', 'reference_product' and 'index'.

### Rules ###
- A reference product matches when it is the item itself ('tomato' for "red tomato") or one of its components ('bean' and 'chilli' for "chili bean sauce"). Favour recall.
- Justify by first breaking the item into components, then checking each reference product against them.
- Similar is not a match: 'spinach' does not match 'rapini'.
- Every 'index' and 'reference_product' must come from the input list. Never invent one.
- Leave out non-matches. Fewer entries beat wrong entries, but report at least one when possible.
- If nothing matches, return a single entry with 'reference_product': '' and 'index': ''. Never return that entry alongside a match.
- For duplicate reference products, report only the first occurrence.
- Rank products that make up most of the item's volume first: 'bean' before 'chilli' for "chili bean sauce".
- Escape special characters in 'justification'. Output the list and nothing else.

### Example input ###
item description: "Ingredient    popped popcorn"
Reference products:
[
{'index': 0, 'reference_product': 'sweet corn'},
{'index': 4, 'reference_product': 'maize grain, organic'},
{'index': 5, 'reference_product': 'lime, packed'},
{'index': 7, 'reference_product': 'maize grain'},
{'index': 9, 'reference_product': 'maize grain, feed'},
{'index': 12, 'reference_product': 'tomato, fresh grade'}
]

### Example output ###
[
{'justification': 'Popcorn is made from maize kernels, so maize grain is the most relevant.', 'reference_product': 'maize grain', 'index': 7},
{'justification': 'Organic maize grain is also maize, the raw material of popcorn.', 'reference_product': 'maize grain, organic', 'index': 4},
{'justification': 'Feed maize grain is still maize grain.', 'reference_product': 'maize grain, feed', 'index': 9}
]

### Input ###
Information on item: {item}
Reference products: {candidates}
"#;

pub const BEST_IMPACT_FACTOR: &str = r#"
### Instructions ###
You are a Life Cycle Assessment expert performing a process-based LCA.
You have an 'item description' and candidate impact factors, each with 'impact_factor_name', 'reference_product' and 'product_info'.
Report the first and second impact factors that exactly match the item, in that order. Favour precision.
Each entry has exactly the keys 'justification', 'index' and 'impact_factor_name', where 'index' is the 'index' value of the factor in the list below.

### Rules ###
- An exact match covers the item directly ('market for grape' covers 'black grape') or covers every component of the item.
- Similar is not exact. For 'rapini', 'market for spinach' is not a match; return None for 'index' and 'impact_factor_name'.
- The match must cover every component and every process applied to the item. 'market for artichoke' does not cover 'frozen artichoke'. For 'popcorn' a match must include popping, so 'market for maize grain' is not exact.
- Justify by breaking the item into components, then checking each factor against all of them.
- With no exact match return None for 'index' and 'impact_factor_name'.
- When a factor starting with 'market for' and a factor named 'X production' or 'production of X' cover the same product, ALWAYS choose the 'market for' factor first, regardless of any extra qualifiers on the production factor. Given 'table grape' with 'market for grape' and 'grape production', 'market for grape' is first and 'grape production' second.
- For duplicate names report only the first occurrence.
- Between two similar factors where one says 'organic', choose the one without 'organic' unless the item is clearly organic.
- Every 'index' and 'impact_factor_name' must come from the input or be None.
- Escape special characters in 'justification'. Return the Python list and nothing else, for example:
[{'justification': '...', 'index': 3, 'impact_factor_name': '...'}, {'justification': '...', 'index': None, 'impact_factor_name': None}]

### Example input ###
item description: "hot salsa"
Impact factor list:
[
{'index': 0, 'impact_factor_name': 'tomato production, fresh grade, open field', 'reference_product': 'tomato, fresh grade', 'product_info': 'A fruit. Annual crop.'},
{'index': 1, 'impact_factor_name': 'market for coriander', 'reference_product': 'coriander', 'product_info': 'A herb. Annual crop.'}
]

### Example output ###
[
{'justification': 'Hot salsa combines tomato, chilli and other ingredients; no single factor covers all of them.', 'index': None, 'impact_factor_name': None}
]

### Input ###
Item description: {item}
Impact factor list:
{candidates}
"#;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(item|candidates)\}").expect("valid regex"));

/// Fill a template's `{item}` and `{candidates}` placeholders in one pass;
/// braces inside the substituted text are left alone.
pub fn render(template: &str, item: &str, candidates: &str) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "item" => item,
            _ => candidates,
        })
        .into_owned()
}

/// Prompt for a retry: the previous failure first, then the untouched instructions.
pub fn retry_prompt(error: &str, original: &str) -> String {
    format!(
        "Your previous response, when parsed, caused this error: {error}\n\
         This time generate a response that does not cause this error.\n\
         ### ORIGINAL INSTRUCTIONS ###\n{original}"
    )
}
