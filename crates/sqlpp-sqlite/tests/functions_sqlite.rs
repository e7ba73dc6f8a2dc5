use sqlpp_sqlite::{Aggregate, Connection, Query, Value};

fn scores() -> Connection {
    let conn = Connection::open_memory().expect("open sqlite memory db");
    assert!(
        conn.execute(
            "CREATE TABLE scores (team TEXT, points INTEGER);
             INSERT INTO scores VALUES ('red', 10), ('red', 20), ('blue', 30);"
        )
        .is_ok()
    );
    conn
}

fn scalar<T>(conn: &Connection, sql: &str) -> Result<T, sqlpp_sqlite::Error>
where
    T: for<'a> sqlpp_sqlite::FromSql<'a>,
{
    let mut q = Query::new(conn, sql)?;
    let cursor = q.begin()?;
    let value = cursor
        .current()
        .map(|row| row.get::<T>(0))
        .expect("one row");
    Ok(value)
}

#[derive(Default)]
struct Summary {
    count: i64,
    total: i64,
    max: Option<i64>,
}

impl Aggregate<(i64,)> for Summary {
    type Output = String;

    fn step(&mut self, (points,): (i64,)) {
        self.count += 1;
        self.total += points;
        self.max = Some(self.max.map_or(points, |m| m.max(points)));
    }

    fn finish(self) -> String {
        format!("{}/{}/{}", self.count, self.total, self.max.unwrap_or(0))
    }
}

#[derive(Default)]
struct Fragile(i64);

impl Aggregate<(i64,)> for Fragile {
    type Output = i64;

    fn step(&mut self, (points,): (i64,)) {
        assert!(points < 25, "points out of range: {points}");
        self.0 += points;
    }

    fn finish(self) -> i64 {
        self.0
    }
}

#[test]
fn addition_function_and_sum_aggregate() {
    let conn = scores();
    assert!(conn.create_function("f", |a: i32, b: i32| a + b).is_ok());
    assert_eq!(scalar::<i32>(&conn, "SELECT f(2, 3)").expect("call f"), 5);

    #[derive(Default)]
    struct Sum(i64);
    impl Aggregate<(i64,)> for Sum {
        type Output = i64;
        fn step(&mut self, (v,): (i64,)) {
            self.0 += v;
        }
        fn finish(self) -> i64 {
            self.0
        }
    }
    assert!(conn.create_aggregate::<Sum, (i64,)>("mysum").is_ok());
    assert_eq!(scalar::<i64>(&conn, "SELECT mysum(points) FROM scores").expect("sum"), 60);
}

#[test]
fn aggregate_state_is_per_group() {
    let conn = scores();
    assert!(conn.create_aggregate::<Summary, (i64,)>("summary").is_ok());

    let mut q = Query::new(
        &conn,
        "SELECT team, summary(points) FROM scores GROUP BY team ORDER BY team",
    )
    .expect("prepare grouped");
    let groups: Vec<(String, String)> = q
        .map_rows(|row| row.get_columns::<(String, String)>([0, 1]))
        .collect::<Result<_, _>>()
        .expect("read groups");
    assert_eq!(
        groups,
        vec![
            ("blue".to_string(), "1/30/30".to_string()),
            ("red".to_string(), "2/30/20".to_string()),
        ]
    );

    // a group without rows finishes a default state
    assert_eq!(
        scalar::<String>(&conn, "SELECT summary(points) FROM scores WHERE team = 'green'")
            .expect("empty aggregate"),
        "0/0/0"
    );
}

#[test]
fn aggregate_panic_fails_the_query_only() {
    let conn = scores();
    assert!(conn.create_aggregate::<Fragile, (i64,)>("fragile").is_ok());

    let err = scalar::<i64>(&conn, "SELECT fragile(points) FROM scores")
        .expect_err("step panics on 30");
    let message = err.to_string();
    assert!(message.contains("aggregate `fragile` panicked in step"), "{message}");
    assert!(message.contains("points out of range: 30"), "{message}");

    assert_eq!(
        scalar::<i64>(&conn, "SELECT fragile(points) FROM scores WHERE team = 'red'")
            .expect("small values"),
        30
    );
}

#[test]
fn functions_take_optional_and_dynamic_arguments() {
    let conn = scores();
    assert!(
        conn.create_function("or_default", |v: Option<String>, fallback: String| {
            v.unwrap_or(fallback)
        })
        .is_ok()
    );
    assert!(
        conn.create_function("kind", |v: Value| match v {
            Value::Null => "null",
            Value::BigInt(_) => "integer",
            Value::Double(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Int(_) => "int32",
        })
        .is_ok()
    );

    assert_eq!(
        scalar::<String>(&conn, "SELECT or_default(NULL, 'n/a')").expect("null arg"),
        "n/a"
    );
    assert_eq!(
        scalar::<String>(&conn, "SELECT or_default('x', 'n/a')").expect("text arg"),
        "x"
    );

    let mut q = Query::new(&conn, "SELECT kind(NULL), kind(1), kind(1.5), kind('a'), kind(x'00')")
        .expect("prepare kinds");
    let kinds: Vec<String> = q
        .map_rows(|row| (0..5).map(|i| row.get::<String>(i)).collect::<Vec<_>>())
        .next()
        .expect("one row")
        .expect("step kinds");
    assert_eq!(kinds, ["null", "integer", "real", "text", "blob"]);
}

#[test]
fn functions_may_query_their_own_connection() {
    let conn = scores();
    let status = conn.create_function_raw("points_of", 1, |ctx| {
        let team: String = ctx.get(0);
        // SAFETY: the handle belongs to the connection running this call
        let db = unsafe { Connection::borrow_raw(ctx.db_handle()) };
        let total = Query::new(&db, "SELECT SUM(points) FROM scores WHERE team = ?")
            .and_then(|mut q| {
                let _ = q.bind(1, team.as_str());
                let cursor = q.begin()?;
                let total = cursor.current().map_or(0, |row| row.get::<i64>(0));
                Ok(total)
            });
        match total {
            Ok(total) => ctx.result(&total),
            Err(err) => ctx.result_error(&err.to_string()),
        }
    });
    assert!(status.is_ok());

    let mut q = Query::new(&conn, "SELECT DISTINCT team, points_of(team) FROM scores ORDER BY team")
        .expect("prepare reentrant");
    let totals: Vec<(String, i64)> = q
        .map_rows(|row| row.get_columns::<(String, i64)>([0, 1]))
        .collect::<Result<_, _>>()
        .expect("read totals");
    assert_eq!(totals, vec![("blue".to_string(), 30), ("red".to_string(), 30)]);
}
