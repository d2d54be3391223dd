use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use simbridge::{
    missing, BridgeError, BridgeResult, CategoricalAdjustment, CategoricalSpec, Cell, ColumnData,
    CommandTemplates, ConstructionError, DataDictionary, DataFrame, InMemoryEngine, LevelValue,
    LifecycleBridge, Matrix, MemoryPreferences, ParameterChange, ParameterObserver, ParameterSet,
    RecordingMessageSink, SimulationHost, SingleVarWeights, StatEngine, UpdateOutcome,
    ValidationError, Value, Variables, WeightCalculator,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn people(kids: &[&str]) -> Value {
    let frame = DataFrame::new("people")
        .with_column(
            "kids",
            ColumnData::Text(kids.iter().map(|k| (*k).to_string()).collect()),
        )
        .unwrap();
    Value::Frame(frame)
}

fn kids(level: &str) -> Variables {
    Variables::from([("kids".to_string(), LevelValue::from(level))])
}

#[derive(Default)]
struct CountingObserver(AtomicUsize);

impl ParameterObserver for CountingObserver {
    fn parameters_changed(&self, _change: &ParameterChange) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn single_variable_edit_cycle() {
    init_logging();
    let engine = InMemoryEngine::new();
    engine
        .assign("people", people(&["A", "A", "A", "B", "B", "B", "B", "B", "B", "B"]))
        .unwrap();

    let sink = Arc::new(RecordingMessageSink::new());
    let dictionary = DataDictionary::new().with("kids", "Number of children");
    let mut weights = SingleVarWeights::builder("people$kids", "kids")
        .dictionary(&dictionary)
        .messages(sink.clone())
        .build(&engine)
        .unwrap();
    let observer = Arc::new(CountingObserver::default());
    assert!(weights.add_observer(observer.clone()));

    assert_eq!(weights.name(), "Weightings - Number of children");
    assert!((weights.level_weight(&kids("A")).unwrap() - 0.3).abs() < 1e-12);
    assert!((weights.weight(&kids("A")).unwrap() - 1.0).abs() < 1e-12);

    // A alone moved to 0.5: the levels now total 1.2
    weights.set_numerator("A", 0.5).unwrap();
    let outcome = weights.update().unwrap();
    let total = match outcome {
        UpdateOutcome::Rejected(ValidationError::WeightSumMismatch { total, .. }) => total,
        other => panic!("expected rejection, got {other:?}"),
    };
    assert!((total - 1.2).abs() < 1e-9);
    assert_eq!(sink.messages().len(), 1);
    assert!(sink.messages()[0].contains("1.2"));
    assert_eq!(observer.0.load(Ordering::SeqCst), 0);
    assert!((weights.level_weight(&kids("A")).unwrap() - 0.3).abs() < 1e-12);

    weights.set_numerator("B", 0.5).unwrap();
    assert!(weights.update().unwrap().is_published());
    assert_eq!(observer.0.load(Ordering::SeqCst), 1);
    assert!((weights.weight(&kids("A")).unwrap() - 0.5 / 0.3).abs() < 1e-12);

    weights.reset_defaults().unwrap();
    assert_eq!(observer.0.load(Ordering::SeqCst), 2);
    assert_eq!(weights.all_level_props().unwrap(), vec![0.3, 0.7]);

    let err = weights.weight(&kids("C")).unwrap_err();
    assert!(err.is_programmer_error());
}

#[test]
fn saved_weights_survive_a_new_session() {
    init_logging();
    let engine = InMemoryEngine::new();
    engine.assign("people", people(&["A", "B"])).unwrap();

    let mut prefs = MemoryPreferences::new();
    let mut first = SingleVarWeights::builder("people$kids", "kids").build(&engine).unwrap();
    first.set_numerator("A", 0.25).unwrap();
    first.set_numerator("B", 0.75).unwrap();
    first.update().unwrap();
    first.save_state(&mut prefs).unwrap();

    let mut second = SingleVarWeights::builder("people$kids", "kids").build(&engine).unwrap();
    let stream = second.subscribe();
    second.load_state(&prefs).unwrap();
    assert_eq!(second.all_level_props().unwrap(), vec![0.25, 0.75]);
    assert_eq!(stream.recv_timeout(Duration::from_millis(10)).map(|c| c.sequence), Some(1));
}

struct Static;

impl SimulationHost for Static {
    fn iteration(&self) -> u64 {
        0
    }

    fn snapshot(&self) -> BridgeResult<DataFrame> {
        Ok(DataFrame::new("empty"))
    }
}

#[test]
fn command_output_is_picked_up_on_reload() {
    init_logging();
    let engine = Arc::new(InMemoryEngine::new());
    engine.assign("people", people(&["A", "A", "A", "B", "B", "B", "B", "B", "B", "B"])).unwrap();
    engine
        .define_function("rebalance", |vars, _| {
            vars.insert("people".to_string(), people(&["A", "B"]));
            Ok(Value::Null)
        })
        .unwrap();

    let mut weights = SingleVarWeights::builder("people$kids", "kids")
        .build(engine.as_ref())
        .unwrap();
    let stream = weights.subscribe();

    let mut bridge = LifecycleBridge::new(engine.clone(), CommandTemplates::new().with_run_end("rebalance()"));
    bridge.on_run_start(&Static).unwrap();
    bridge.on_run_stop(&Static).unwrap();

    assert!(weights.reload(engine.as_ref()).unwrap().is_published());
    assert_eq!(weights.all_level_props().unwrap(), vec![0.5, 0.5]);
    assert_eq!(stream.drain().len(), 1);
}

fn adjustment_engine() -> Arc<InMemoryEngine> {
    let engine = Arc::new(InMemoryEngine::new());
    let matrix = Matrix {
        nrow: 3,
        ncol: 2,
        data: vec![0.012, 0.5, 0.25, 0.1, 0.003, 0.9],
        row_names: None,
        col_names: Some(vec!["1".into(), "2".into()]),
    };
    engine.assign("env$catadjs$sol1", Value::Matrix(matrix)).unwrap();
    engine
}

fn sol_spec(factor: f64) -> CategoricalSpec {
    CategoricalSpec {
        r_matrix_varname: "env$catadjs$sol1".to_string(),
        r_variable: "sol1".to_string(),
        display_adj_factor: factor,
    }
}

fn read_back(engine: &InMemoryEngine, name: &str) -> DataFrame {
    DataFrame::from_value(name, &engine.get(name).unwrap().unwrap()).unwrap()
}

#[test]
fn unedited_matrix_round_trips_at_original_scale() {
    init_logging();
    let engine = adjustment_engine();
    let adj = CategoricalAdjustment::new(engine.clone(), sol_spec(100.0), &DataDictionary::new()).unwrap();

    let shown = adj.table();
    assert!((shown.cell(0, "1").and_then(|c| c.as_f64()).unwrap() - 1.2).abs() < 1e-9);

    adj.assign_r_matrix().unwrap();
    let written = read_back(&engine, "env$catadjs$sol1");
    let expected = [("1", [0.012, 0.5, 0.25]), ("2", [0.1, 0.003, 0.9])];
    for (column, values) in expected {
        for (row, value) in values.into_iter().enumerate() {
            let got = written.cell(row, column).and_then(|c| c.as_f64()).unwrap();
            assert!((got - value).abs() < 1e-12, "{column}[{row}] = {got}");
        }
    }
}

#[test]
fn reset_fills_float_matrix_with_missing() {
    init_logging();
    let engine = adjustment_engine();
    let mut adj = CategoricalAdjustment::new(engine.clone(), sol_spec(100.0), &DataDictionary::new()).unwrap();
    adj.reset_defaults().unwrap();

    let written = read_back(&engine, "env$catadjs$sol1");
    for column in ["1", "2"] {
        for row in 0..3 {
            let Some(Cell::Float(v)) = written.cell(row, column) else {
                panic!("{column}[{row}] is not a float cell");
            };
            assert!(missing::is_float(v));
        }
    }
    assert!(adj.table().cell(0, "1").is_some_and(|c| c.is_missing()));
}

fn spec_table(factor: ColumnData) -> Value {
    let frame = DataFrame::new("specs")
        .with_column(
            "rMatrixVarname",
            ColumnData::Text(vec!["env$catadjs$sol1".into(), "env$catadjs$fsmoke".into()]),
        )
        .unwrap()
        .with_column("rVariable", ColumnData::Text(vec!["sol1".into(), "fsmoke".into()]))
        .unwrap()
        .with_column("displayAdjFactor", factor)
        .unwrap();
    Value::Frame(frame)
}

#[test]
fn batch_factory_builds_one_adjustment_per_row() {
    init_logging();
    let engine = adjustment_engine();
    engine
        .assign(
            "env$catadjs$fsmoke",
            Value::Frame(
                DataFrame::new("fsmoke")
                    .with_column("p", ColumnData::Float(vec![0.2, 0.8]))
                    .unwrap(),
            ),
        )
        .unwrap();
    let engine: Arc<dyn StatEngine> = engine;
    let dictionary = DataDictionary::new().with("sol1", "Standard of living");

    let batch = CategoricalAdjustment::from_spec_table(
        &engine,
        &spec_table(ColumnData::Float(vec![100.0, 1.0])),
        &dictionary,
    )
    .unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].name(), "Standard of living");
    assert_eq!(batch[1].name(), "fsmoke");
    assert_eq!(batch[0].spec().r_matrix_varname, "env$catadjs$sol1");
    assert_eq!(batch[1].spec().r_matrix_varname, "env$catadjs$fsmoke");
    assert_eq!(batch[0].spec().r_variable, "sol1");
    assert!((batch[0].spec().display_adj_factor - 100.0).abs() < f64::EPSILON);
    assert!((batch[1].spec().display_adj_factor - 1.0).abs() < f64::EPSILON);
    let shown = batch[0].table().cell(0, "1").and_then(|c| c.as_f64()).unwrap();
    assert!((shown - 1.2).abs() < 1e-9);
    let shown = batch[1].table().cell(1, "p").and_then(|c| c.as_f64()).unwrap();
    assert!((shown - 0.8).abs() < 1e-12);
    assert!(batch[0].weight(&Variables::new()).unwrap_err().is_not_implemented());

    let err = CategoricalAdjustment::from_spec_table(&engine, &Value::numeric(vec![1.0]), &dictionary)
        .unwrap_err();
    assert!(matches!(err, BridgeError::Construction(ConstructionError::NotTabular { .. })));

    let err = CategoricalAdjustment::from_spec_table(
        &engine,
        &spec_table(ColumnData::Text(vec!["100".into(), "x".into()])),
        &dictionary,
    )
    .unwrap_err();
    assert!(matches!(err, BridgeError::Construction(ConstructionError::BadColumnType { .. })));

    let err = CategoricalAdjustment::from_spec_table(
        &engine,
        &spec_table(ColumnData::Float(vec![100.0, 0.0])),
        &dictionary,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Construction(ConstructionError::BadAdjustmentFactor { ref varname, .. })
            if varname == "env$catadjs$fsmoke"
    ));
}

#[test]
fn scaled_integer_matrix_resets_to_declared_sentinels() {
    init_logging();
    let engine = Arc::new(InMemoryEngine::new());
    let counts = DataFrame::new("counts")
        .with_column("n", ColumnData::Int(vec![4, 7]))
        .unwrap()
        .with_column("flag", ColumnData::Byte(vec![1, 0]))
        .unwrap();
    engine.assign("env$counts", Value::Frame(counts)).unwrap();
    let spec = CategoricalSpec {
        r_matrix_varname: "env$counts".to_string(),
        r_variable: "n".to_string(),
        display_adj_factor: 10.0,
    };

    let mut adj = CategoricalAdjustment::new(engine.clone(), spec, &DataDictionary::new()).unwrap();
    adj.assign_r_matrix().unwrap();
    let written = read_back(&engine, "env$counts");
    assert_eq!(written.cell(1, "n"), Some(Cell::Int(7)));
    assert_eq!(written.cell(0, "flag"), Some(Cell::Byte(1)));

    adj.reset_defaults().unwrap();
    let written = read_back(&engine, "env$counts");
    for row in 0..2 {
        assert_eq!(written.cell(row, "n"), Some(Cell::Int(missing::INT)));
        assert_eq!(written.cell(row, "flag"), Some(Cell::Byte(missing::BYTE)));
    }
}

#[test]
fn matrix_class_survives_write_back() {
    init_logging();
    let engine = adjustment_engine();
    let mut adj = CategoricalAdjustment::new(engine.clone(), sol_spec(100.0), &DataDictionary::new()).unwrap();
    adj.set_cell(2, "2", 45.0).unwrap();
    adj.assign_r_matrix().unwrap();

    let written = engine.get("env$catadjs$sol1").unwrap().unwrap();
    assert_eq!(written.class(), "matrix");
    let Value::Matrix(m) = written else { unreachable!() };
    assert!((m.get(2, 1).unwrap() - 0.45).abs() < 1e-12);
    assert!((m.get(0, 0).unwrap() - 0.012).abs() < 1e-12);
}
