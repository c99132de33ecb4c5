//! NF-e document extraction into an invoice header and declared items.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::error::DocumentParseError;
use crate::models::invoice::{DATE_SENTINEL, InvoiceHeader, Party, Protocol, Totals};
use crate::models::item::{CanonicalItemRecord, ItemDraft, Origin};

use super::xml::{XmlElement, parse_tree};

/// Namespace of NF-e documents.
pub const NFE_NAMESPACE: &str = "http://www.portalfiscal.inf.br/nfe";

/// Prefix carried by the infNFe Id attribute in front of the access key.
const ACCESS_KEY_PREFIX: &str = "NFe";

/// motDesICMS value for a SUFRAMA (free-trade-zone) exemption.
const SUFRAMA_REASON_CODE: &str = "7";

type NodeLocator = for<'a> fn(&'a XmlElement, Scope) -> Option<&'a XmlElement>;

/// Namespace-aware lookups with defaults for absent nodes.
#[derive(Debug, Clone, Copy)]
struct Scope {
    ns: Option<&'static str>,
}

impl Scope {
    fn for_root(root: &XmlElement) -> Self {
        let ns = (root.namespace.as_deref() == Some(NFE_NAMESPACE)).then_some(NFE_NAMESPACE);
        Self { ns }
    }

    fn child<'a>(&self, node: Option<&'a XmlElement>, name: &str) -> Option<&'a XmlElement> {
        node.and_then(|n| n.child(self.ns, name))
    }

    fn text<'a>(&self, node: Option<&'a XmlElement>, name: &str) -> &'a str {
        self.child(node, name).map(|n| n.text.trim()).unwrap_or("")
    }
}

/// Extracts the declared invoice from NF-e XML (bare `NFe` or `nfeProc` envelope).
pub struct DocumentExtractor;

impl DocumentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Parse an NF-e document.
    ///
    /// Only a missing/invalid root or invoice-info node is fatal; absent
    /// sections and unparsable values degrade to defaults and are noted in
    /// [`InvoiceHeader::warnings`].
    pub fn parse(&self, xml: &str) -> Result<InvoiceHeader, DocumentParseError> {
        let root = parse_tree(xml)?;
        let scope = Scope::for_root(&root);

        let inf_nfe = locate_invoice_info(&root, scope).ok_or(DocumentParseError::MissingInvoiceInfo)?;
        let mut warnings = Vec::new();

        let raw_id = inf_nfe.attribute("Id").unwrap_or("");
        let access_key = raw_id.strip_prefix(ACCESS_KEY_PREFIX).unwrap_or(raw_id).to_string();
        if access_key.is_empty() {
            note(&mut warnings, "access key (infNFe Id) is missing");
        }

        let inf = Some(inf_nfe);

        // Identification
        let ide = scope.child(inf, "ide");
        let number = parse_number(scope.text(ide, "nNF"), "nNF", &mut warnings);
        let series = parse_number(scope.text(ide, "serie"), "serie", &mut warnings);
        let issue_text = match scope.text(ide, "dhEmi") {
            "" => scope.text(ide, "dEmi"),
            text => text,
        };
        let issue_date = parse_date(issue_text, "issue date", &mut warnings);

        // Parties
        let emit = scope.child(inf, "emit");
        let issuer = Party {
            name: scope.text(emit, "xNome").to_string(),
            tax_id: first_non_empty(&[scope.text(emit, "CNPJ"), scope.text(emit, "CPF")]),
            city: scope.text(scope.child(emit, "enderEmit"), "xMun").to_string(),
        };

        let dest = scope.child(inf, "dest");
        let recipient = Party {
            name: scope.text(dest, "xNome").to_string(),
            tax_id: first_non_empty(&[scope.text(dest, "CNPJ"), scope.text(dest, "CPF")]),
            city: scope.text(scope.child(dest, "enderDest"), "xMun").to_string(),
        };

        // Totals
        let icms_tot = scope.child(scope.child(inf, "total"), "ICMSTot");
        let totals = Totals {
            products: parse_decimal(scope.text(icms_tot, "vProd"), "vProd", &mut warnings),
            invoice: parse_decimal(scope.text(icms_tot, "vNF"), "vNF", &mut warnings),
            tax: parse_decimal(scope.text(icms_tot, "vICMS"), "vICMS", &mut warnings),
        };

        let freight_mode = scope.text(scope.child(inf, "transp"), "modFrete").to_string();

        // Protocol lives outside infNFe, under the nfeProc envelope
        let prot_nfe = root
            .child(scope.ns, "protNFe")
            .or_else(|| root.descendant(scope.ns, "protNFe"));
        let inf_prot = scope.child(prot_nfe, "infProt");
        let protocol = match inf_prot {
            Some(_) => Protocol {
                number: scope.text(inf_prot, "nProt").to_string(),
                received_at: parse_date(scope.text(inf_prot, "dhRecbto"), "protocol date", &mut warnings),
            },
            None => Protocol::default(),
        };

        // Items
        let dets = inf_nfe.descendants(scope.ns, "det");
        let mut items = Vec::with_capacity(dets.len());
        for det in dets {
            match self.parse_item(det, scope, &mut warnings) {
                Some(item) => items.push(item),
                None => continue,
            }
        }

        info!(
            "Parsed NF-e {} with {} items ({} warnings)",
            access_key,
            items.len(),
            warnings.len()
        );

        Ok(InvoiceHeader {
            access_key,
            number,
            series,
            issue_date,
            issuer,
            recipient,
            totals,
            freight_mode,
            protocol,
            items,
            warnings,
        })
    }

    fn parse_item(
        &self,
        det: &XmlElement,
        scope: Scope,
        warnings: &mut Vec<String>,
    ) -> Option<CanonicalItemRecord> {
        let raw_index = det.attribute("nItem").unwrap_or("");
        let item_index = raw_index.trim().parse::<u32>().unwrap_or(0);

        let det = Some(det);
        let Some(prod) = scope.child(det, "prod") else {
            note(warnings, format!("item {}: missing prod section, skipped", raw_index));
            return None;
        };
        let prod = Some(prod);

        let mut draft = ItemDraft::new(item_index);
        draft.product_code = scope.text(prod, "cProd").to_string();
        draft.product_description = scope.text(prod, "xProd").to_string();
        draft.ncm = scope.text(prod, "NCM").to_string();
        draft.cest = scope.text(prod, "CEST").to_string();
        draft.cfop = scope.text(prod, "CFOP").to_string();
        draft.quantity = parse_decimal(scope.text(prod, "qCom"), "qCom", warnings);
        draft.unit_price = parse_decimal(scope.text(prod, "vUnCom"), "vUnCom", warnings);
        draft.amount_total = parse_decimal(scope.text(prod, "vProd"), "vProd", warnings);

        // ICMS holds exactly one regime group (ICMS00, ICMS40, ICMSSN102...)
        let icms = scope.child(scope.child(det, "imposto"), "ICMS");
        if let Some(group) = icms.and_then(XmlElement::first_child) {
            let group = Some(group);
            draft.cst = first_non_empty(&[scope.text(group, "CST"), scope.text(group, "CSOSN")]);
            draft.tax_base = parse_decimal(scope.text(group, "vBC"), "vBC", warnings);
            draft.tax_rate = parse_decimal(scope.text(group, "pICMS"), "pICMS", warnings);
            draft.tax_value = parse_decimal(scope.text(group, "vICMS"), "vICMS", warnings);
            draft.mva_percent = parse_decimal(scope.text(group, "pMVAST"), "pMVAST", warnings);
            draft.benefit_value = parse_decimal(scope.text(group, "vICMSDeson"), "vICMSDeson", warnings);
            draft.is_suframa_benefit = scope.text(group, "motDesICMS") == SUFRAMA_REASON_CODE;
        } else {
            debug!("Item {} has no ICMS regime group", item_index);
        }

        match draft.build(Origin::Declared) {
            Ok(record) => Some(record),
            Err(e) => {
                note(warnings, format!("item {:?}: {}, skipped", raw_index, e));
                None
            }
        }
    }
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Find infNFe directly under the root, under an NFe wrapper, or anywhere.
fn locate_invoice_info(root: &XmlElement, scope: Scope) -> Option<&XmlElement> {
    let locators: [NodeLocator; 3] = [
        |root, scope| root.child(scope.ns, "infNFe"),
        |root, scope| root.child(scope.ns, "NFe").and_then(|nfe| nfe.child(scope.ns, "infNFe")),
        |root, scope| root.descendant(scope.ns, "infNFe"),
    ];
    locators.iter().find_map(|locate| locate(root, scope))
}

fn note(warnings: &mut Vec<String>, message: impl Into<String>) {
    let message = message.into();
    warn!("{}", message);
    warnings.push(message);
}

fn first_non_empty(values: &[&str]) -> String {
    values
        .iter()
        .find(|v| !v.is_empty())
        .map(|v| v.to_string())
        .unwrap_or_default()
}

fn parse_decimal(text: &str, field: &str, warnings: &mut Vec<String>) -> Decimal {
    if text.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(text).unwrap_or_else(|_| {
        note(warnings, format!("{}: invalid decimal {:?}, using 0", field, text));
        Decimal::ZERO
    })
}

fn parse_number(text: &str, field: &str, warnings: &mut Vec<String>) -> u32 {
    if text.is_empty() {
        return 0;
    }
    text.parse().unwrap_or_else(|_| {
        note(warnings, format!("{}: invalid number {:?}, using 0", field, text));
        0
    })
}

/// Parse ISO timestamps with offset, naive timestamps, or bare dates.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.naive_local())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_date(text: &str, field: &str, warnings: &mut Vec<String>) -> NaiveDateTime {
    if text.is_empty() {
        note(warnings, format!("{} is missing", field));
        return DATE_SENTINEL;
    }
    parse_datetime(text).unwrap_or_else(|| {
        note(warnings, format!("{}: unparsable date {:?}", field, text));
        DATE_SENTINEL
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ENVELOPED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00">
  <NFe>
    <infNFe Id="NFe16240112345678000199550010000012341000012345" versao="4.00">
      <ide><serie>1</serie><nNF>1234</nNF><dhEmi>2024-01-15T10:30:00-03:00</dhEmi></ide>
      <emit>
        <CNPJ>12345678000199</CNPJ><xNome>DISTRIBUIDORA NORTE LTDA</xNome>
        <enderEmit><xMun>Manaus</xMun></enderEmit>
      </emit>
      <dest><CPF>12345678909</CPF><xNome>MERCADO AMAPA</xNome></dest>
      <det nItem="1">
        <prod>
          <cProd>QJ-01</cProd><xProd>QUEIJO PRATO</xProd><NCM>04069020</NCM><CEST>1702400</CEST>
          <CFOP>6110</CFOP><qCom>10.0000</qCom><vUnCom>10.00</vUnCom><vProd>100.00</vProd>
        </prod>
        <imposto><ICMS><ICMS00><orig>0</orig><CST>00</CST><vBC>100.00</vBC><pICMS>18.00</pICMS><vICMS>18.00</vICMS></ICMS00></ICMS></imposto>
      </det>
      <det nItem="2">
        <prod>
          <cProd>QJ-02</cProd><xProd>QUEIJO MUSSARELA</xProd><NCM>04061010</NCM>
          <CFOP>6110</CFOP><qCom>1</qCom><vUnCom>50.00</vUnCom><vProd>50.00</vProd>
        </prod>
        <imposto><ICMS><ICMS40><orig>0</orig><CST>40</CST><vICMSDeson>9.00</vICMSDeson><motDesICMS>7</motDesICMS></ICMS40></ICMS></imposto>
      </det>
      <total><ICMSTot><vBC>100.00</vBC><vICMS>18.00</vICMS><vProd>150.00</vProd><vNF>150.00</vNF></ICMSTot></total>
      <transp><modFrete>9</modFrete></transp>
    </infNFe>
  </NFe>
  <protNFe versao="4.00"><infProt><nProt>116240000012345</nProt><dhRecbto>2024-01-15T10:31:05-03:00</dhRecbto></infProt></protNFe>
</nfeProc>"#;

    #[test]
    fn test_parse_enveloped_document() {
        let header = DocumentExtractor::new().parse(ENVELOPED).unwrap();

        assert_eq!(header.access_key, "16240112345678000199550010000012341000012345");
        assert_eq!(header.number, 1234);
        assert_eq!(header.series, 1);
        assert_eq!(header.issue_date, parse_datetime("2024-01-15T10:30:00").unwrap());
        assert_eq!(header.issuer.name, "DISTRIBUIDORA NORTE LTDA");
        assert_eq!(header.issuer.city, "Manaus");
        assert_eq!(header.recipient.tax_id, "12345678909");
        assert_eq!(header.totals.products, Decimal::new(15000, 2));
        assert_eq!(header.freight_mode, "9");
        assert_eq!(header.protocol.number, "116240000012345");
        assert!(header.warnings.is_empty(), "{:?}", header.warnings);
    }

    #[test]
    fn test_parse_items_and_regime_choice() {
        let header = DocumentExtractor::new().parse(ENVELOPED).unwrap();
        assert_eq!(header.item_count(), 2);

        let taxed = &header.items[0];
        assert_eq!(taxed.item_index(), 1);
        assert_eq!(taxed.cst(), "00");
        assert_eq!(taxed.tax_value(), Decimal::new(1800, 2));
        assert_eq!(taxed.quantity(), Decimal::new(10, 0));
        assert!(!taxed.is_suframa_benefit());

        let exempt = &header.items[1];
        assert_eq!(exempt.cst(), "40");
        assert_eq!(exempt.cest(), "");
        assert_eq!(exempt.benefit_value(), Decimal::new(900, 2));
        assert!(exempt.is_suframa_benefit());
    }

    #[test]
    fn test_parse_bare_document_without_namespace() {
        let xml = r#"<NFe><infNFe Id="NFe123"><ide><nNF>7</nNF><dEmi>2010-05-02</dEmi></ide>
            <det nItem="1"><prod><cProd>A</cProd><vProd>1.00</vProd></prod></det></infNFe></NFe>"#;

        let header = DocumentExtractor::new().parse(xml).unwrap();
        assert_eq!(header.access_key, "123");
        assert_eq!(header.number, 7);
        assert!(header.has_issue_date());
        assert_eq!(header.items.len(), 1);
        assert_eq!(header.protocol, Protocol::default());
    }

    #[test]
    fn test_degraded_fields_do_not_abort() {
        let xml = r#"<NFe><infNFe Id="NFe1"><ide><nNF>x</nNF><dhEmi>ontem</dhEmi></ide>
            <total><ICMSTot><vProd>abc</vProd></ICMSTot></total>
            <det nItem="0"><prod><cProd>A</cProd></prod></det>
            <det nItem="2"><prod><cProd>B</cProd></prod></det></infNFe></NFe>"#;

        let header = DocumentExtractor::new().parse(xml).unwrap();
        assert_eq!(header.number, 0);
        assert_eq!(header.issue_date, DATE_SENTINEL);
        assert_eq!(header.totals.products, Decimal::ZERO);
        assert_eq!(header.items.len(), 1);
        assert_eq!(header.items[0].product_code(), "B");
        assert_eq!(header.warnings.len(), 4);
    }

    #[test]
    fn test_missing_invoice_info_is_fatal() {
        let err = DocumentExtractor::new().parse("<nfeProc><other/></nfeProc>").unwrap_err();
        assert!(matches!(err, DocumentParseError::MissingInvoiceInfo));
    }

    #[test]
    fn test_not_xml_is_fatal() {
        let err = DocumentExtractor::new().parse("").unwrap_err();
        assert!(matches!(err, DocumentParseError::MissingRoot));
    }
}
