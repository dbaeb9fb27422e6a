//! Static tables mapping gateway codes to human labels.
//!
//! Unknown codes must never crash the pipeline; `translate` degrades to
//! returning the raw code unchanged.

pub const ENERGY: &[(&str, &str)] = &[("ELECTRICITE", "Électricité"), ("GAZ", "Gaz")];

pub const OFFERS: &[(&str, &str)] = &[
    ("GN_2", "Offre Gaz naturel"),
    ("MCGN_2", "Mon Contrat gaz naturel"),
    ("MCGN_PRIX_FIXE_1", "Mon Contrat Gaz Naturel a prix fixe"),
    ("ELECTRICITE_PRO", "Electricite Pro"),
    ("ELEC_DEREGULE", "Mon Contrat Electricite"),
    ("ELEC_PRO_PX_FIXE_1", "Electricite Pro a Prix Fixe"),
    ("ESSENTIEL_PRO", "Essentiel Pro"),
    ("OFFRE_HC_SOUPLES", "Heures Creuses Souples"),
    ("PRESENCE_PRO", "Presence Pro"),
    ("SOUPLESSE_PRO", "Souplesse Pro"),
    ("TARIF_BLEU", "Tarif Bleu"),
    ("TARIF_BLEU_PART", "Tarif Bleu"),
    ("ESSENTIEL_GAZ", "Essentiel Gaz"),
    ("GAZ", "Mon Contrat Gaz Naturel"),
    ("GAZ_2", "Mon Contrat Gaz Naturel"),
    ("GAZ_NAT_PX_FIXE_1", "Gaz Naturel a Prix Fixe"),
    ("PRESENCE_GAZ", "Presence Gaz"),
    ("SOUPLESSE_GAZ", "Souplesse Gaz"),
    ("TARIF_BLEU_GAZ", "Gaz Naturel"),
    ("TARIF_EJP_PART", "EJP"),
    ("OFFRE_TPN", "TPN"),
];

pub const POWERS: &[(&str, &str)] = &[
    ("PUI00", "0 kVA"),
    ("PUI03", "3 kVA"),
    ("PUI06", "6 kVA"),
    ("PUI09", "9 kVA"),
    ("PUI12", "12 kVA"),
    ("PUI15", "15 kVA"),
    ("PUI18", "18 kVA"),
    ("PUI24", "24 kVA"),
    ("PUI30", "30 kVA"),
    ("PUI36", "36 kVA"),
];

/// Dictionary lookup with identity fallback.
pub fn translate(dict: &[(&str, &str)], code: &str) -> String {
    dict.iter()
        .find(|(key, _)| *key == code)
        .map(|(_, label)| (*label).to_string())
        .unwrap_or_else(|| code.to_string())
}
