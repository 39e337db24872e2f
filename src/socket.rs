mod std;
