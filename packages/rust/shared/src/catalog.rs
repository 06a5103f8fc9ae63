//! Static lookup tables: the UK location grid, search keywords, relevance
//! terms, built-in source descriptors, and the service phrase dictionary.

use crate::types::{
    DirectoryDescriptor, DirectorySelectors, GridCell, SearchEngineDescriptor, SearchSelectors,
};

// ---------------------------------------------------------------------------
// Location grid
// ---------------------------------------------------------------------------

type County = (&'static str, &'static [&'static str]);

/// Country → county → towns, in collection order.
pub const LOCATIONS: &[(&str, &[County])] = &[
    (
        "England",
        &[
            (
                "Greater London",
                &[
                    "London", "Croydon", "Bromley", "Harrow", "Ealing", "Barnet", "Enfield",
                    "Richmond upon Thames", "Kingston upon Thames", "Sutton",
                ],
            ),
            (
                "West Midlands",
                &[
                    "Birmingham", "Coventry", "Wolverhampton", "Walsall", "Dudley", "Solihull",
                    "Sutton Coldfield",
                ],
            ),
            (
                "Greater Manchester",
                &[
                    "Manchester", "Salford", "Bolton", "Stockport", "Oldham", "Wigan",
                    "Altrincham",
                ],
            ),
            (
                "West Yorkshire",
                &["Leeds", "Bradford", "Wakefield", "Huddersfield", "Halifax", "Harrogate"],
            ),
            (
                "Surrey",
                &["Guildford", "Woking", "Epsom", "Reigate", "Camberley", "Farnham"],
            ),
            (
                "Kent",
                &[
                    "Maidstone", "Canterbury", "Ashford", "Tonbridge", "Tunbridge Wells",
                    "Sevenoaks",
                ],
            ),
            (
                "Hampshire",
                &["Winchester", "Southampton", "Portsmouth", "Basingstoke", "Andover"],
            ),
            (
                "Berkshire",
                &["Reading", "Slough", "Windsor", "Maidenhead", "Wokingham", "Newbury"],
            ),
            (
                "Oxfordshire",
                &["Oxford", "Banbury", "Bicester", "Witney", "Abingdon", "Henley-on-Thames"],
            ),
            (
                "Devon",
                &["Exeter", "Plymouth", "Torquay", "Barnstaple", "Tiverton"],
            ),
            (
                "Gloucestershire",
                &["Gloucester", "Cheltenham", "Stroud", "Cirencester", "Tewkesbury"],
            ),
        ],
    ),
    (
        "Scotland",
        &[
            ("City of Edinburgh", &["Edinburgh", "Leith", "Musselburgh"]),
            ("Glasgow City", &["Glasgow", "Paisley", "East Kilbride"]),
            ("Aberdeenshire", &["Aberdeen", "Peterhead", "Inverurie"]),
        ],
    ),
    (
        "Wales",
        &[
            ("Cardiff", &["Cardiff", "Penarth", "Barry"]),
            ("Swansea", &["Swansea", "Neath", "Port Talbot"]),
        ],
    ),
    (
        "Northern Ireland",
        &[("County Antrim", &["Belfast", "Lisburn", "Ballymena"])],
    ),
];

/// Flatten [`LOCATIONS`] into grid cells, preserving declaration order.
pub fn location_grid() -> Vec<GridCell> {
    LOCATIONS
        .iter()
        .flat_map(|(country, counties)| {
            counties.iter().flat_map(move |(county, towns)| {
                towns.iter().map(move |town| GridCell::new(country, county, town))
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Keywords and relevance
// ---------------------------------------------------------------------------

/// Search keywords, most productive first.
pub const KEYWORDS: &[&str] = &[
    "garden office",
    "garden office pod",
    "garden office shed",
    "garden room",
    "garden room pod",
    "garden building",
    "garden office building",
    "garden office construction",
    "garden office installation",
    "garden office builders",
    "garden office company",
    "garden office specialist",
    "garden office contractor",
    "garden office manufacturer",
    "garden office supplier",
    "garden office designer",
    "garden office installer",
    "garden office provider",
    "garden office service",
    "garden office solutions",
    "garden office uk",
    "bespoke garden office",
    "custom garden office",
    "luxury garden office",
    "insulated garden office",
    "garden studio",
    "garden cabin",
];

/// A search hit or listing is relevant if its title or snippet mentions one of these.
pub const RELEVANT_TERMS: &[&str] = &[
    "garden office",
    "garden room",
    "garden building",
    "garden pod",
    "garden shed",
    "garden studio",
    "garden workspace",
    "garden annex",
    "garden extension",
    "garden cabin",
    "garden lodge",
    "garden retreat",
];

/// Case-insensitive relevance check over a title and snippet.
pub fn is_relevant(title: &str, snippet: &str) -> bool {
    let text = format!("{title} {snippet}").to_lowercase();
    RELEVANT_TERMS.iter().any(|term| text.contains(term))
}

// ---------------------------------------------------------------------------
// Source descriptors
// ---------------------------------------------------------------------------

fn engine(name: &str, url: &str, sel: [&str; 4]) -> SearchEngineDescriptor {
    SearchEngineDescriptor {
        name: name.into(),
        url: url.into(),
        selectors: SearchSelectors {
            results: sel[0].into(),
            title: sel[1].into(),
            link: sel[2].into(),
            snippet: sel[3].into(),
        },
    }
}

fn directory(name: &str, url: &str, location_param: &str, sel: [&str; 6]) -> DirectoryDescriptor {
    DirectoryDescriptor {
        name: name.into(),
        url: url.into(),
        location_param: location_param.into(),
        selectors: DirectorySelectors {
            results: sel[0].into(),
            name: sel[1].into(),
            phone: sel[2].into(),
            address: sel[3].into(),
            website: sel[4].into(),
            description: sel[5].into(),
        },
    }
}

/// Built-in search engines.
pub fn search_engines() -> Vec<SearchEngineDescriptor> {
    vec![
        engine(
            "Google",
            "https://www.google.com/search?q=",
            [".g", "h3", "a[href]", ".VwiC3b"],
        ),
        engine(
            "Bing",
            "https://www.bing.com/search?q=",
            [".b_algo", "h2 a", "h2 a[href]", ".b_caption p"],
        ),
        engine(
            "Yahoo",
            "https://search.yahoo.com/search?p=",
            [".dd", "h3 a", "h3 a[href]", ".compText"],
        ),
        engine(
            "DuckDuckGo",
            "https://html.duckduckgo.com/html/?q=",
            [
                ".result",
                ".result__title a",
                ".result__title a[href]",
                ".result__snippet",
            ],
        ),
    ]
}

/// Built-in business directories.
pub fn directories() -> Vec<DirectoryDescriptor> {
    let listing = [
        ".listing",
        ".listing__title",
        ".listing__phone",
        ".listing__address",
        ".listing__website",
        ".listing__description",
    ];
    let business = [
        ".business-listing",
        ".business-name",
        ".business-phone",
        ".business-address",
        ".business-website",
        ".business-description",
    ];
    vec![
        directory(
            "Yell",
            "https://www.yell.com/ucs/UcsSearchAction.do?keywords=",
            "&location=",
            [
                ".businessCapsule",
                ".businessCapsule--name",
                ".business--telephoneNumber",
                ".business--address",
                ".businessCapsule--ctaItem--website",
                ".businessCapsule--text",
            ],
        ),
        directory(
            "Thomson Local",
            "https://www.thomsonlocal.com/search/",
            "/",
            [
                ".listing",
                ".listing__name",
                ".listing__phone",
                ".listing__address",
                ".listing__website",
                ".listing__description",
            ],
        ),
        directory(
            "Touch Local",
            "https://www.touchlocal.com/search?q=",
            "&location=",
            business,
        ),
        directory("FreeIndex", "https://www.freeindex.co.uk/search/", "/", listing),
        directory("Hotfrog", "https://www.hotfrog.co.uk/search/", "/", business),
        directory("Cylex", "https://www.cylex-uk.co.uk/search/", "/", listing),
        directory("192.com", "https://www.192.com/search/", "/", business),
    ]
}

// ---------------------------------------------------------------------------
// Service dictionary
// ---------------------------------------------------------------------------

/// Free-text service phrase → service slug.
pub const SERVICE_PHRASES: &[(&str, &str)] = &[
    ("garden office", "garden-office"),
    ("garden office pod", "garden-office-pod"),
    ("garden office shed", "garden-office-shed"),
    ("garden room", "garden-room"),
    ("garden building", "garden-building"),
    ("garden studio", "garden-studio"),
    ("garden workspace", "garden-workspace"),
    ("garden annex", "garden-annex"),
    ("garden extension", "garden-extension"),
    ("garden cabin", "garden-cabin"),
    ("garden lodge", "garden-lodge"),
    ("garden retreat", "garden-retreat"),
    ("garden office building", "garden-office-building"),
    ("garden office construction", "garden-office-construction"),
    ("garden office installation", "garden-office-installation"),
    ("garden office design", "garden-office-design"),
    ("bespoke garden office", "bespoke-garden-office"),
    ("custom garden office", "custom-garden-office"),
    ("designer garden office", "designer-garden-office"),
    ("luxury garden office", "luxury-garden-office"),
    ("modern garden office", "modern-garden-office"),
    ("contemporary garden office", "contemporary-garden-office"),
    ("traditional garden office", "traditional-garden-office"),
    ("insulated garden office", "insulated-garden-office"),
    ("garden office insulation", "garden-office-insulation"),
    ("garden office heating", "garden-office-heating"),
    ("garden office electrical", "garden-office-electrical"),
    ("garden office plumbing", "garden-office-plumbing"),
    ("garden office broadband", "garden-office-broadband"),
    ("garden office lighting", "garden-office-lighting"),
    ("garden office windows", "garden-office-windows"),
    ("garden office doors", "garden-office-doors"),
    ("garden office flooring", "garden-office-flooring"),
    ("garden office roof", "garden-office-roof"),
    ("garden office foundation", "garden-office-foundation"),
    ("garden office base", "garden-office-base"),
    ("garden office planning permission", "garden-office-planning-permission"),
    ("garden office building regulations", "garden-office-building-regulations"),
    ("garden office home office", "garden-office-home-office"),
    ("garden office gym", "garden-office-gym"),
    ("garden office music", "garden-office-music"),
    ("garden office annex", "garden-office-annex"),
    ("garden office conversion", "garden-office-conversion"),
    ("garden office renovation", "garden-office-renovation"),
    ("garden office refurbishment", "garden-office-refurbishment"),
    ("garden office made to measure", "garden-office-made-to-measure"),
];

/// Look up a service slug. The key is matched lowercase with hyphens read as
/// spaces, so every slug maps back to itself.
pub fn service_slug(phrase: &str) -> Option<&'static str> {
    let key = phrase
        .to_lowercase()
        .replace('-', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    SERVICE_PHRASES
        .iter()
        .find(|(p, _)| *p == key)
        .map(|(_, slug)| *slug)
}
