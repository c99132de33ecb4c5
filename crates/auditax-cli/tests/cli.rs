use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe"><NFe><infNFe Id="NFe13240100000000000100550010000000011000000010">
<ide><nNF>1</nNF><serie>1</serie><dhEmi>2024-01-10T08:00:00-04:00</dhEmi></ide>
<emit><CNPJ>00000000000100</CNPJ><xNome>BEBIDAS SA</xNome></emit>
<det nItem="1"><prod><cProd>REF-1</cProd><xProd>REFRIGERANTE</xProd><NCM>22021000</NCM><CFOP>6110</CFOP>
<qCom>1</qCom><vUnCom>100.00</vUnCom><vProd>100.00</vProd></prod>
<imposto><ICMS><ICMS00><CST>00</CST><vBC>100.00</vBC><pICMS>18.00</pICMS><vICMS>18.00</vICMS></ICMS00></ICMS></imposto></det>
<total><ICMSTot><vProd>100.00</vProd><vICMS>18.00</vICMS><vNF>100.00</vNF></ICMSTot></total>
</infNFe></NFe></nfeProc>"#;

fn report(tax: &str) -> String {
    format!(
        r#"<html><body>
<table><tr><td>INFORMAÇÕES DETALHADAS</td></tr><tr><td>ITEM</td><td>OPERAÇÃO</td><td>CFOP</td></tr>
<tr><td>1</td><td>ST</td><td>6110-VENDA</td></tr></table>
<table><tr><td><h2>ITEM:1</h2></td><td><h5>PRODUTO</h5>REF-1 REFRIGERANTE</td><td><h5>NCM</h5>22021000</td>
<td><h5>CST</h5>00</td><td><h5>CÁLCULO VALOR(SEFAZ)</h5>R$ {tax}</td></tr>
<tr><td>-</td></tr><tr><td>-</td></tr><tr><td>F) BASE DE CALCULO = R$ 100,00</td></tr></table>
</body></html>"#
    )
}

fn workspace(tax: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("nota.xml"), DOCUMENT).unwrap();
    fs::write(dir.path().join("nota.html"), report(tax)).unwrap();
    dir
}

fn auditax(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("auditax").unwrap();
    cmd.current_dir(dir.path())
        .arg("--config")
        .arg(dir.path().join("config.json"));
    cmd
}

#[test]
fn audit_compliant_invoice_as_json() {
    let dir = workspace("18,03");
    fs::write(dir.path().join("config.json"), "{}").unwrap();

    auditax(&dir)
        .args(["audit", "--document", "nota.xml", "--portal", "nota.html"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"compliant\": 1"))
        .stdout(predicate::str::contains("\"divergent\": 0"));
}

#[test]
fn audit_divergent_invoice_as_csv() {
    let dir = workspace("18,10");
    fs::write(dir.path().join("config.json"), "{}").unwrap();

    auditax(&dir)
        .args(["audit", "-d", "nota.xml", "-p", "nota.html", "--format", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("kind,item,product,field,declared,portal,message"))
        .stdout(predicate::str::contains("audit,1,REF-1,TAX_VALUE,18.00,18.10"));
}

#[test]
fn strict_mode_fails_on_divergence() {
    let dir = workspace("18,10");
    fs::write(dir.path().join("config.json"), "{}").unwrap();

    auditax(&dir)
        .args(["audit", "-d", "nota.xml", "-p", "nota.html", "--strict", "--format", "text"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Divergent:          1"));
}

#[test]
fn configured_tolerance_is_applied() {
    let dir = workspace("18,10");
    fs::write(
        dir.path().join("config.json"),
        r#"{"reconcile": {"tax_value_tolerance": "0.20"}}"#,
    )
    .unwrap();

    auditax(&dir)
        .args(["audit", "-d", "nota.xml", "-p", "nota.html", "--strict"])
        .assert()
        .success();
}

#[test]
fn report_without_items_is_kept_for_diagnosis() {
    let dir = workspace("18,00");
    fs::write(dir.path().join("config.json"), "{}").unwrap();
    fs::write(dir.path().join("empty.html"), "<html><body>Sessão expirada</body></html>").unwrap();

    auditax(&dir)
        .args(["audit", "-d", "nota.xml", "-p", "empty.html", "--dump-dir", "diag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no items extracted"));

    let kept = fs::read_to_string(dir.path().join("diag").join("portal-report-error.html")).unwrap();
    assert!(kept.contains("Sessão expirada"));
}

#[test]
fn latin1_report_is_decoded() {
    let dir = workspace("18,00");
    fs::write(dir.path().join("config.json"), "{}").unwrap();
    let html = report("18,00");
    let (encoded, _, _) = encoding_rs::WINDOWS_1252.encode(&html);
    fs::write(dir.path().join("nota.html"), &*encoded).unwrap();

    auditax(&dir)
        .args(["audit", "-d", "nota.xml", "-p", "nota.html", "--encoding", "latin1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"compliant\": 1"));
}

#[test]
fn document_command_prints_header() {
    let dir = workspace("18,00");

    auditax(&dir)
        .args(["document", "nota.xml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("13240100000000000100550010000000011000000010"))
        .stdout(predicate::str::contains("BEBIDAS SA"));
}

#[test]
fn portal_command_prints_records() {
    let dir = workspace("455,25");

    auditax(&dir)
        .args(["portal", "nota.html"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tax_value\": \"455.25\""));
}

#[test]
fn batch_writes_summary() {
    let dir = workspace("18,10");
    fs::write(dir.path().join("config.json"), "{}").unwrap();

    auditax(&dir)
        .args(["batch", "*.xml", "--output-dir", "out", "--summary", "--format", "csv"])
        .assert()
        .success();

    let summary = fs::read_to_string(dir.path().join("out").join("summary.csv")).unwrap();
    assert!(summary.contains("nota.xml,success,13240100000000000100550010000000011000000010,1,0,1,0,0"));
    assert!(dir.path().join("out").join("nota.csv").exists());
}

#[test]
fn config_init_and_get() {
    let dir = TempDir::new().unwrap();

    auditax(&dir).args(["config", "init"]).assert().success();
    assert!(dir.path().join("config.json").exists());

    auditax(&dir)
        .args(["config", "set", "reconcile.mva_tolerance", "0.01"])
        .assert()
        .success();

    auditax(&dir)
        .args(["config", "get", "reconcile.mva_tolerance"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0.01"));
}
