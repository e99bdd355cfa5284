use pizzaria_deploy::compose::{self, parse_ps};

#[test]
fn published_ports_from_short_syntax() {
    let manifest = "\
services:
  web:
    build: .
    ports:
      - \"8080:80\"
      - \"127.0.0.1:8443:443\"
  api:
    image: pizzaria-api:latest
    ports:
      - \"3000:3000/tcp\"
      - \"9229\"
  db:
    image: postgres:16
";

    let ports = compose::published_ports(manifest).unwrap();

    assert_eq!(ports, vec![8080, 8443, 3000]);
}

#[test]
fn published_ports_deduplicated() {
    let manifest = "\
services:
  web:
    image: nginx
    ports:
      - \"80:80\"
  admin:
    image: nginx
    ports:
      - \"80:8080\"
";

    assert_eq!(compose::published_ports(manifest).unwrap(), vec![80]);
}

#[test]
fn no_ports_published() {
    let manifest = "services:\n  worker:\n    image: busybox\n";

    assert!(compose::published_ports(manifest).unwrap().is_empty());
}

#[test]
fn invalid_manifest_is_an_error() {
    assert!(compose::published_ports("services: [not, a, map").is_err());
}

#[test]
fn ps_lines_from_engine() {
    let output = concat!(
        r#"{"ID":"3f1a","Names":"pizzaria-web-1","State":"running","Status":"Up 2 minutes","#,
        r#""Ports":"0.0.0.0:8080->80/tcp, :::8080->80/tcp","#,
        r#""Labels":"com.docker.compose.project=pizzaria,com.docker.compose.service=web"}"#,
        "\n",
        r#"{"ID":"9c2b","Names":"pizzaria-db-1","State":"exited","Status":"Exited (1) 3 hours ago","#,
        r#""Ports":"","Labels":"com.docker.compose.service=db,com.docker.compose.project=pizzaria"}"#,
        "\n",
    );

    let containers = parse_ps(output).unwrap();

    assert_eq!(containers.len(), 2);
    assert_eq!(containers[0].name, "pizzaria-web-1");
    assert_eq!(containers[0].service, "web");
    assert!(containers[0].is_running());
    assert_eq!(containers[0].publishers.len(), 2);
    assert_eq!(containers[0].publishers[0].published_port, 8080);
    assert_eq!(containers[0].publishers[0].target_port, 80);
    assert_eq!(containers[0].publishers[0].url, "0.0.0.0");
    assert_eq!(containers[1].service, "db");
    assert!(!containers[1].is_running());
    assert!(containers[1].publishers.is_empty());
}

#[test]
fn compose_v1_containers_are_listed_like_v2() {
    // v1 names containers with underscores; the labels are the same
    let output = concat!(
        r#"{"Names":"pizzaria_web_1","State":"running","Status":"Up 10 minutes","#,
        r#""Ports":"0.0.0.0:80->80/tcp","#,
        r#""Labels":"com.docker.compose.version=1.29.2,com.docker.compose.project=pizzaria,com.docker.compose.service=web"}"#,
    );

    let containers = parse_ps(output).unwrap();

    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].service, "web");
    assert!(containers[0].is_running());
    assert_eq!(containers[0].publishers[0].published_port, 80);
}

#[test]
fn state_derived_from_status_on_old_engines() {
    let output = concat!(
        r#"{"Names":"pizzaria-web-1","Status":"Up 3 seconds"}"#,
        "\n",
        r#"{"Names":"pizzaria-db-1","Status":"Exited (0) 1 minute ago"}"#,
    );

    let containers = parse_ps(output).unwrap();

    assert!(containers[0].is_running());
    assert!(!containers[1].is_running());
}

#[test]
fn engine_ports_skip_unpublished_and_ranges() {
    let publishers =
        compose::parse_engine_ports("9000/tcp, 127.0.0.1:8443->443/tcp, 0.0.0.0:7000-7001->7000-7001/udp");

    assert_eq!(publishers.len(), 1);
    assert_eq!(publishers[0].url, "127.0.0.1");
    assert_eq!(publishers[0].published_port, 8443);
    assert_eq!(publishers[0].protocol, "tcp");
}

#[test]
fn ps_empty_output() {
    assert!(parse_ps("").unwrap().is_empty());
    assert!(parse_ps("  \n").unwrap().is_empty());
}

#[test]
fn ps_garbage_is_an_error() {
    assert!(parse_ps("unknown flag: --format").is_err());
}
